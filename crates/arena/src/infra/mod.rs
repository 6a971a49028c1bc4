pub mod db;
pub mod file_utils;
pub mod gateway;
pub mod secrets;

// Mock implementations only available with e2e-testing feature or debug builds
#[cfg(any(feature = "e2e-testing", debug_assertions))]
pub mod gateway_mock;
