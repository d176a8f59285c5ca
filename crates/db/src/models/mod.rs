pub mod audit_log;
pub mod chat_message;
pub mod document;
pub mod event;
pub mod garden;
pub mod notification;
pub mod payment;
pub mod plant_guide;
pub mod plot;
pub mod post;
pub mod qr_code;
pub mod task;
pub mod user;
pub mod water_log;
