//! Generation parameters and the mutation pass binding them onto a template.
//!
//! Mutation targets are located by a fixed, mode-dependent table of
//! well-known node ids. A target absent from the document is silently
//! skipped; documents are allowed to omit optional stages.
use std::time::{SystemTime, UNIX_EPOCH};

use crate::workflow::graph::Workflow;
use crate::workflow::template::{
    GenerationMode, IMAGE_LOAD_NODE, LATENT_NODE, NEGATIVE_NODE, POSITIVE_NODE, SAMPLER_NODE,
};

pub const DEFAULT_NEGATIVE: &str = "blurry, low quality, distorted, ugly, bad anatomy, low res, \
     poorly drawn, deformed, pixelated, noise, artifacts";

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub positive: String,
    pub negative: String,
    pub steps: u32,
    pub cfg: f64,
    /// Ignored in image-to-image mode; dimensions follow the source image.
    pub width: u32,
    pub height: u32,
    /// `None` derives a time-based seed. Callers needing reproducibility
    /// must always pass an explicit seed.
    pub seed: Option<i64>,
    /// Fraction of the generation applied on top of the source latent.
    /// Pinned to 1.0 in text-to-image mode.
    pub denoise: f64,
    pub source_image: Option<Vec<u8>>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        GenerationParams {
            positive: String::new(),
            negative: DEFAULT_NEGATIVE.to_string(),
            steps: 28,
            cfg: 1.0,
            width: 1280,
            height: 1280,
            seed: None,
            denoise: 0.75,
            source_image: None,
        }
    }
}

/// A source image uploaded alongside the workflow. The base64 wire encoding
/// happens in the client.
#[derive(Debug, Clone, PartialEq)]
pub struct InputImage {
    pub name: String,
    pub data: Vec<u8>,
}

/// Well-known node ids for one generation mode.
#[derive(Debug, Clone, Copy)]
pub struct NodeTable {
    pub positive: &'static str,
    pub negative: &'static str,
    pub sampler: &'static str,
    pub latent: Option<&'static str>,
    pub image_load: Option<&'static str>,
    /// Fixed denoise for modes that must start from pure noise.
    pub pin_denoise: Option<f64>,
}

pub const TEXT_TO_IMAGE_NODES: NodeTable = NodeTable {
    positive: POSITIVE_NODE,
    negative: NEGATIVE_NODE,
    sampler: SAMPLER_NODE,
    latent: Some(LATENT_NODE),
    image_load: None,
    pin_denoise: Some(1.0),
};

pub const IMAGE_TO_IMAGE_NODES: NodeTable = NodeTable {
    positive: POSITIVE_NODE,
    negative: NEGATIVE_NODE,
    sampler: SAMPLER_NODE,
    latent: None,
    image_load: Some(IMAGE_LOAD_NODE),
    pin_denoise: None,
};

impl NodeTable {
    pub fn for_mode(mode: GenerationMode) -> &'static NodeTable {
        match mode {
            GenerationMode::TextToImage => &TEXT_TO_IMAGE_NODES,
            GenerationMode::ImageToImage => &IMAGE_TO_IMAGE_NODES,
        }
    }
}

/// Produce an independent copy of `template` with `params` bound onto the
/// nodes named by `table`, plus any attachments to upload with it.
///
/// The input template is never mutated; templates are reused across requests.
pub fn apply_params(
    template: &Workflow,
    params: &GenerationParams,
    table: &NodeTable,
) -> (Workflow, Vec<InputImage>) {
    let mut wf = template.clone();

    if let Some(node) = wf.node_mut(table.positive) {
        node.set_input("text", params.positive.as_str());
    }
    if let Some(node) = wf.node_mut(table.negative) {
        node.set_input("text", params.negative.as_str());
    }

    let denoise = table.pin_denoise.unwrap_or(params.denoise);
    if let Some(node) = wf.node_mut(table.sampler) {
        node.set_input("seed", params.seed.unwrap_or_else(unix_seed));
        node.set_input("steps", params.steps);
        node.set_input("cfg", params.cfg);
        node.set_input("denoise", denoise);
    }

    if let Some(latent_id) = table.latent {
        if let Some(node) = wf.node_mut(latent_id) {
            node.set_input("width", params.width);
            node.set_input("height", params.height);
        }
    }

    let mut attachments = Vec::new();
    if let (Some(load_id), Some(data)) = (table.image_load, params.source_image.as_ref()) {
        if let Some(node) = wf.node_mut(load_id) {
            let name = format!("input_{}.png", uuid::Uuid::new_v4().simple());
            node.set_input("image", name.as_str());
            // The graph references the upload by name; the bytes travel in
            // the request's images array.
            attachments.push(InputImage {
                name,
                data: data.clone(),
            });
        }
    }

    (wf, attachments)
}

fn unix_seed() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::template::{embedded_image_to_image, embedded_text_to_image};
    use serde_json::json;

    fn params_with_seed(seed: i64) -> GenerationParams {
        GenerationParams {
            positive: "a mystical forest".to_string(),
            seed: Some(seed),
            ..GenerationParams::default()
        }
    }

    #[test]
    fn template_is_never_mutated() {
        let template = embedded_text_to_image();
        let before = template.clone();
        let params = params_with_seed(7);
        let _ = apply_params(&template, &params, &TEXT_TO_IMAGE_NODES);
        assert_eq!(template, before);
    }

    #[test]
    fn text_to_image_pins_denoise_to_one() {
        let template = embedded_text_to_image();
        let params = GenerationParams {
            denoise: 0.3,
            ..params_with_seed(7)
        };
        let (wf, _) = apply_params(&template, &params, &TEXT_TO_IMAGE_NODES);
        let sampler = wf.node(SAMPLER_NODE).unwrap();
        assert_eq!(sampler.input("denoise"), Some(&json!(1.0)));
    }

    #[test]
    fn image_to_image_honors_denoise() {
        let template = embedded_image_to_image();
        let params = GenerationParams {
            denoise: 0.6,
            source_image: Some(vec![1, 2, 3]),
            ..params_with_seed(7)
        };
        let (wf, attachments) = apply_params(&template, &params, &IMAGE_TO_IMAGE_NODES);
        let sampler = wf.node(SAMPLER_NODE).unwrap();
        assert_eq!(sampler.input("denoise"), Some(&json!(0.6)));
        // The load node references the generated upload name
        assert_eq!(attachments.len(), 1);
        let name = wf
            .node(IMAGE_LOAD_NODE)
            .unwrap()
            .input("image")
            .and_then(|v| v.as_str())
            .unwrap();
        assert_eq!(attachments[0].name, name);
        assert_eq!(attachments[0].data, vec![1, 2, 3]);
    }

    #[test]
    fn explicit_seed_is_used_verbatim() {
        let template = embedded_text_to_image();
        let (wf, _) = apply_params(&template, &params_with_seed(123456), &TEXT_TO_IMAGE_NODES);
        assert_eq!(
            wf.node(SAMPLER_NODE).unwrap().input("seed"),
            Some(&json!(123456))
        );
    }

    #[test]
    fn absent_seed_derives_from_wall_clock() {
        let template = embedded_text_to_image();
        let params = GenerationParams {
            seed: None,
            ..params_with_seed(0)
        };
        let before = unix_seed();
        let (wf, _) = apply_params(&template, &params, &TEXT_TO_IMAGE_NODES);
        let seed = wf
            .node(SAMPLER_NODE)
            .unwrap()
            .input("seed")
            .and_then(|v| v.as_i64())
            .unwrap();
        assert!(seed >= before && seed <= unix_seed());
    }

    #[test]
    fn prompt_and_sampler_fields_are_written() {
        let template = embedded_text_to_image();
        let params = GenerationParams {
            positive: "a cat".to_string(),
            negative: "blurry".to_string(),
            steps: 30,
            cfg: 4.5,
            width: 1024,
            height: 768,
            ..params_with_seed(1)
        };
        let (wf, attachments) = apply_params(&template, &params, &TEXT_TO_IMAGE_NODES);
        assert!(attachments.is_empty());
        assert_eq!(wf.node(POSITIVE_NODE).unwrap().input("text"), Some(&json!("a cat")));
        assert_eq!(wf.node(NEGATIVE_NODE).unwrap().input("text"), Some(&json!("blurry")));
        let sampler = wf.node(SAMPLER_NODE).unwrap();
        assert_eq!(sampler.input("steps"), Some(&json!(30)));
        assert_eq!(sampler.input("cfg"), Some(&json!(4.5)));
        let latent = wf.node(LATENT_NODE).unwrap();
        assert_eq!(latent.input("width"), Some(&json!(1024)));
        assert_eq!(latent.input("height"), Some(&json!(768)));
    }

    #[test]
    fn absent_target_nodes_are_skipped() {
        let mut template = embedded_text_to_image();
        template.remove(LATENT_NODE);
        template.remove(NEGATIVE_NODE);
        let (wf, _) = apply_params(&template, &params_with_seed(5), &TEXT_TO_IMAGE_NODES);
        assert!(!wf.contains(LATENT_NODE));
        assert!(!wf.contains(NEGATIVE_NODE));
        // The sampler is still parameterized
        assert_eq!(wf.node(SAMPLER_NODE).unwrap().input("seed"), Some(&json!(5)));
    }
}
