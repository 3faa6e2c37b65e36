pub mod describe;
pub mod infer;
