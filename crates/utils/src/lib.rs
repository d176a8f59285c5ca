pub mod build_info;
pub mod pagination;
pub mod response;
pub mod sanitize;
