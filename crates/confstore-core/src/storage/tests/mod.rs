#[cfg(test)]
mod macros_tests;
