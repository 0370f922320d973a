pub mod rudp;
pub mod http;

#[cfg(test)]
mod end_to_end_tests;
