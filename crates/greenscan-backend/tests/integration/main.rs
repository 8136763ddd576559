//! Integration tests for greenscan-backend
//!
//! Uses wiremock to simulate the Greenscan API and verifies end-to-end
//! behavior of the HttpBackend: analysis, record operations, usage counter
//! endpoints, and the error-taxonomy mapping.

mod common;

mod test_analyze;
mod test_errors;
mod test_records;
mod test_usage;
