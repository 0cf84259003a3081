mod binary_tests;
mod reader_tests;
