pub mod engine;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;
