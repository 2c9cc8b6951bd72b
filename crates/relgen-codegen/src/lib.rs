//! relgen-codegen: turns a schema analysis into generated functions
//!
//! - `naming`: stable function names for specialized functions, generic
//!   fallbacks and dispatchers
//! - `renderer`: the [`StrategyRenderer`] seam and the built-in outline renderer
//! - `dispatch`: per-relation routing between specialized and generic functions
//! - `compile`: validate, analyze, render and assemble in one call
//!
//! Renderers are passed in through [`GenerationConfig`]; there is no global
//! registry.

pub mod compile;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod naming;
pub mod renderer;

pub use compile::{compile, CompiledSchema, GeneratedFunction};
pub use config::{GenerationConfig, GenerationConfigBuilder};
pub use dispatch::{collect_function_names, DispatchPlan, RelationRoutes, Route, TypeRoutes};
pub use error::{CodegenError, CodegenResult};
pub use renderer::{
    Operation, OutlineRenderer, RenderError, RenderRequest, StrategyRenderer, DEPTH_EXCEEDED_CODE,
    DEPTH_EXCEEDED_MESSAGE,
};
