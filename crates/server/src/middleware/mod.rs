pub mod extractors;
pub mod model_loaders;
pub mod security;

pub use extractors::{ApiPath, ApiQuery, Validated};
pub use model_loaders::{
    load_document_middleware, load_event_middleware, load_garden_middleware,
    load_plot_middleware, load_post_middleware, load_task_middleware,
};
pub use security::{attach_error_stack, security_header_layers};
