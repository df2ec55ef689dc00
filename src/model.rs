use std::path::PathBuf;

use anyhow::Result;
use candle_transformers::models::stable_diffusion::StableDiffusionConfig;
use clap::ValueEnum;
use hf_hub::api::sync::Api;

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum StableDiffusionVersion {
    Turbo,
    V1_5,
    V2_1,
    Xl,
}

impl StableDiffusionVersion {
    pub fn repo(&self) -> &'static str {
        match self {
            Self::Turbo => "stabilityai/sdxl-turbo",
            Self::Xl => "stabilityai/stable-diffusion-xl-base-1.0",
            Self::V2_1 => "stabilityai/stable-diffusion-2-1",
            Self::V1_5 => "runwayml/stable-diffusion-v1-5",
        }
    }

    /// Human readable name for the footer and logs.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Turbo => "SDXL-Turbo",
            Self::Xl => "SDXL",
            Self::V2_1 => "Stable Diffusion 2.1",
            Self::V1_5 => "Stable Diffusion 1.5",
        }
    }

    pub fn config(
        &self,
        sliced_attention_size: Option<usize>,
        height: Option<usize>,
        width: Option<usize>,
    ) -> StableDiffusionConfig {
        match self {
            Self::V1_5 => StableDiffusionConfig::v1_5(sliced_attention_size, height, width),
            Self::V2_1 => StableDiffusionConfig::v2_1(sliced_attention_size, height, width),
            Self::Xl => StableDiffusionConfig::sdxl(sliced_attention_size, height, width),
            Self::Turbo => StableDiffusionConfig::sdxl_turbo(sliced_attention_size, height, width),
        }
    }

    /// SDXL-family models condition on two CLIP encoders.
    pub fn has_second_encoder(&self) -> bool {
        matches!(self, Self::Xl | Self::Turbo)
    }

    /// Latent scaling factor applied before decoding with the VAE.
    pub fn vae_scale(&self) -> f64 {
        match self {
            Self::V1_5 | Self::V2_1 | Self::Xl => 0.18215,
            Self::Turbo => 0.13025,
        }
    }

    pub fn unet_file(&self, use_f16: bool) -> &'static str {
        if use_f16 {
            "unet/diffusion_pytorch_model.fp16.safetensors"
        } else {
            "unet/diffusion_pytorch_model.safetensors"
        }
    }

    pub fn vae_file(&self, use_f16: bool) -> &'static str {
        if use_f16 {
            "vae/diffusion_pytorch_model.fp16.safetensors"
        } else {
            "vae/diffusion_pytorch_model.safetensors"
        }
    }

    pub fn clip_file(&self, use_f16: bool) -> &'static str {
        if use_f16 {
            "text_encoder/model.fp16.safetensors"
        } else {
            "text_encoder/model.safetensors"
        }
    }

    pub fn clip2_file(&self, use_f16: bool) -> &'static str {
        if use_f16 {
            "text_encoder_2/model.fp16.safetensors"
        } else {
            "text_encoder_2/model.safetensors"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFile {
    Tokenizer,
    Tokenizer2,
    Clip,
    Clip2,
    Unet,
    Vae,
}

impl ModelFile {
    /// Hub repository and file path this weight is fetched from.
    pub fn location(
        &self,
        version: StableDiffusionVersion,
        use_f16: bool,
    ) -> (&'static str, &'static str) {
        match self {
            Self::Tokenizer => {
                let tokenizer_repo = match version {
                    StableDiffusionVersion::V1_5 | StableDiffusionVersion::V2_1 => {
                        "openai/clip-vit-base-patch32"
                    }
                    StableDiffusionVersion::Xl | StableDiffusionVersion::Turbo => {
                        // This seems similar to the patch32 version except some very small
                        // difference in the split regex.
                        "openai/clip-vit-large-patch14"
                    }
                };
                (tokenizer_repo, "tokenizer.json")
            }
            Self::Tokenizer2 => ("laion/CLIP-ViT-bigG-14-laion2B-39B-b160k", "tokenizer.json"),
            Self::Clip => (version.repo(), version.clip_file(use_f16)),
            Self::Clip2 => (version.repo(), version.clip2_file(use_f16)),
            Self::Unet => (version.repo(), version.unet_file(use_f16)),
            Self::Vae => {
                // Override for SDXL when using f16 weights.
                // See https://github.com/huggingface/candle/issues/1060
                if version.has_second_encoder() && use_f16 {
                    (
                        "madebyollin/sdxl-vae-fp16-fix",
                        "diffusion_pytorch_model.safetensors",
                    )
                } else {
                    (version.repo(), version.vae_file(use_f16))
                }
            }
        }
    }

    /// Resolves the weight file, preferring a local override and downloading
    /// from the hub otherwise.
    pub fn get(
        &self,
        filename: Option<String>,
        version: StableDiffusionVersion,
        use_f16: bool,
    ) -> Result<PathBuf> {
        match filename {
            Some(filename) => Ok(PathBuf::from(filename)),
            None => {
                let (repo, path) = self.location(version, use_f16);
                tracing::info!(repo, path, "fetching model file");
                let filename = Api::new()?.model(repo.to_string()).get(path)?;
                Ok(filename)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdxl_family_uses_two_encoders() {
        assert!(StableDiffusionVersion::Turbo.has_second_encoder());
        assert!(StableDiffusionVersion::Xl.has_second_encoder());
        assert!(!StableDiffusionVersion::V1_5.has_second_encoder());
        assert!(!StableDiffusionVersion::V2_1.has_second_encoder());
    }

    #[test]
    fn f16_vae_is_swapped_for_sdxl_family() {
        let (repo, _) = ModelFile::Vae.location(StableDiffusionVersion::Turbo, true);
        assert_eq!(repo, "madebyollin/sdxl-vae-fp16-fix");
        let (repo, path) = ModelFile::Vae.location(StableDiffusionVersion::Turbo, false);
        assert_eq!(repo, "stabilityai/sdxl-turbo");
        assert_eq!(path, "vae/diffusion_pytorch_model.safetensors");
        let (repo, _) = ModelFile::Vae.location(StableDiffusionVersion::V1_5, true);
        assert_eq!(repo, "runwayml/stable-diffusion-v1-5");
    }

    #[test]
    fn tokenizer_repo_follows_version() {
        let (repo, path) = ModelFile::Tokenizer.location(StableDiffusionVersion::V2_1, false);
        assert_eq!(repo, "openai/clip-vit-base-patch32");
        assert_eq!(path, "tokenizer.json");
        let (repo, _) = ModelFile::Tokenizer.location(StableDiffusionVersion::Turbo, false);
        assert_eq!(repo, "openai/clip-vit-large-patch14");
    }

    #[test]
    fn local_override_skips_the_hub() {
        let path = ModelFile::Unet
            .get(Some("weights/unet.safetensors".to_string()), StableDiffusionVersion::Turbo, false)
            .unwrap();
        assert_eq!(path, PathBuf::from("weights/unet.safetensors"));
    }

    #[test]
    fn turbo_config_is_square_512() {
        let config = StableDiffusionVersion::Turbo.config(None, None, None);
        assert_eq!((config.height, config.width), (512, 512));
        assert!(config.clip2.is_some());
    }
}
