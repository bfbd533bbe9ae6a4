mod result;

pub use result::OperationResult;
