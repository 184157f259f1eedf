//! Baseline workflow documents for the two generation modes.
//!
//! Text-to-image first tries the persisted template file and degrades to the
//! embedded document on any read or parse failure, reported as a warning.
//! Image-to-image always uses the embedded document.
use std::path::Path;

use crate::workflow::graph::{Node, Workflow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    TextToImage,
    ImageToImage,
}

pub const CHECKPOINT_NAME: &str = "flux1-dev-fp8.safetensors";

// Well-known node ids shared by the embedded documents and the mutation
// tables in `params`.
pub(crate) const POSITIVE_NODE: &str = "6";
pub(crate) const NEGATIVE_NODE: &str = "33";
pub(crate) const LATENT_NODE: &str = "27";
pub(crate) const CHECKPOINT_NODE: &str = "30";
pub(crate) const SAMPLER_NODE: &str = "31";
pub(crate) const DECODE_NODE: &str = "8";
pub(crate) const SAVE_NODE: &str = "9";
pub(crate) const IMAGE_LOAD_NODE: &str = "10";
pub(crate) const VAE_ENCODE_NODE: &str = "11";

/// Load the baseline document for a mode.
///
/// Never fails: a missing or unparsable persisted template degrades to the
/// embedded fallback.
pub async fn load_template(mode: GenerationMode, persisted: &Path) -> Workflow {
    match mode {
        GenerationMode::ImageToImage => embedded_image_to_image(),
        GenerationMode::TextToImage => match read_persisted(persisted).await {
            Ok(wf) => wf,
            Err(reason) => {
                tracing::warn!("Falling back to embedded text-to-image template: {reason}");
                embedded_text_to_image()
            }
        },
    }
}

async fn read_persisted(path: &Path) -> Result<Workflow, String> {
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let wf: Workflow =
        serde_json::from_str(&data).map_err(|e| format!("failed to parse {}: {e}", path.display()))?;
    if wf.is_empty() {
        return Err(format!("{} contains no nodes", path.display()));
    }
    Ok(wf)
}

/// The stock FLUX text-to-image graph: prompt encoding into a KSampler fed
/// from an empty latent, decoded and saved.
pub fn embedded_text_to_image() -> Workflow {
    let mut wf = Workflow::new();
    wf.insert(
        POSITIVE_NODE,
        Node::new("CLIPTextEncode")
            .with("text", "")
            .with_ref("clip", CHECKPOINT_NODE, 1)
            .titled("CLIP Text Encode (Prompt)"),
    );
    wf.insert(
        DECODE_NODE,
        Node::new("VAEDecode")
            .with_ref("samples", SAMPLER_NODE, 0)
            .with_ref("vae", CHECKPOINT_NODE, 2)
            .titled("VAE Decode"),
    );
    wf.insert(
        SAVE_NODE,
        Node::new("SaveImage")
            .with("filename_prefix", "flux")
            .with_ref("images", DECODE_NODE, 0)
            .titled("Save Image"),
    );
    wf.insert(
        LATENT_NODE,
        Node::new("EmptySD3LatentImage")
            .with("width", 1024)
            .with("height", 1024)
            .with("batch_size", 1)
            .titled("EmptySD3LatentImage"),
    );
    wf.insert(
        CHECKPOINT_NODE,
        Node::new("CheckpointLoaderSimple")
            .with("ckpt_name", CHECKPOINT_NAME)
            .titled("Load Checkpoint"),
    );
    wf.insert(
        SAMPLER_NODE,
        Node::new("KSampler")
            .with("seed", 42)
            .with("steps", 20)
            .with("cfg", 3.5)
            .with("sampler_name", "euler")
            .with("scheduler", "simple")
            .with("denoise", 1)
            .with_ref("model", CHECKPOINT_NODE, 0)
            .with_ref("positive", POSITIVE_NODE, 0)
            .with_ref("negative", NEGATIVE_NODE, 0)
            .with_ref("latent_image", LATENT_NODE, 0)
            .titled("KSampler"),
    );
    wf.insert(
        NEGATIVE_NODE,
        Node::new("CLIPTextEncode")
            .with("text", "")
            .with_ref("clip", CHECKPOINT_NODE, 1)
            .titled("CLIP Text Encode (Negative)"),
    );
    wf
}

/// The image-to-image variant: the empty latent is replaced by a
/// LoadImage -> VAEEncode chain feeding the sampler's latent input.
pub fn embedded_image_to_image() -> Workflow {
    let mut wf = embedded_text_to_image();
    wf.remove(LATENT_NODE);
    wf.insert(
        IMAGE_LOAD_NODE,
        Node::new("LoadImage")
            .with("image", "input_image.png")
            .with("upload", "image")
            .titled("Load Image"),
    );
    wf.insert(
        VAE_ENCODE_NODE,
        Node::new("VAEEncode")
            .with_ref("pixels", IMAGE_LOAD_NODE, 0)
            .with_ref("vae", CHECKPOINT_NODE, 2)
            .titled("VAE Encode"),
    );
    if let Some(sampler) = wf.node_mut(SAMPLER_NODE) {
        sampler.set_input("latent_image", crate::workflow::graph::node_ref(VAE_ENCODE_NODE, 0));
    }
    wf
}
