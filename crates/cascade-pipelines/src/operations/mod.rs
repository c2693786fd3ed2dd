//! Concrete operations the bundled example pipelines are built from.
//! Each AI step implements [`cascade_engine::AiOperationHooks`]; each
//! non-AI step implements [`cascade_engine::SimpleOperationHooks`].

pub mod consistency;
pub mod entities;
pub mod narrative;
pub mod outline;
pub mod render_image;
pub mod scene_prompt;
pub mod terminology;
pub mod translate;
