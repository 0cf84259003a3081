#[cfg(test)]
mod naming_tests;
