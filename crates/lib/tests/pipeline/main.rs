mod common;

mod build_tests;
mod cleanup_tests;
mod failure_tests;
mod upload_tests;
