mod helpers;

mod manifest_tests;
mod stress_tests;
mod write_tests;
