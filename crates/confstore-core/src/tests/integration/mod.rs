#![cfg(test)]

mod concurrency_tests;
mod persistence_tests;
mod scheme_tests;
