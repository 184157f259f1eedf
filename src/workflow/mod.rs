//! Workflow-graph construction and mutation.
use std::path::Path;

pub mod graph;
pub mod params;
pub mod template;

use graph::Workflow;
use params::{GenerationParams, InputImage, NodeTable};
use template::GenerationMode;

/// Template Store -> Graph Mutator in one step: load the baseline document
/// for `mode` and bind `params` onto it.
pub async fn prepare(
    mode: GenerationMode,
    params: &GenerationParams,
    persisted_template: &Path,
) -> (Workflow, Vec<InputImage>) {
    let template = template::load_template(mode, persisted_template).await;
    params::apply_params(&template, params, NodeTable::for_mode(mode))
}
