#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindError {
    NotFound,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddError {
    Exists,
    Internal,
}

mod session;

mod backend_file;
pub use backend_file::*;
