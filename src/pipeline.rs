use candle_transformers::models::stable_diffusion::{
    build_clip_transformer, clip::ClipTextTransformer, unet_2d::UNet2DConditionModel,
    vae::AutoEncoderKL, StableDiffusionConfig,
};

use crate::{
    inference::{GenerationRequest, TextToImage},
    model::{ModelFile, StableDiffusionVersion},
    utils::{device, device_label, tensor_to_image},
    Args, Error,
};
use anyhow::{Error as E, Result};
use candle_core::{DType, Device, IndexOp, Module, Tensor, D};
use image::RgbImage;
use tokenizers::Tokenizer;

/// Guidance values above this run classifier-free guidance.
const GUIDANCE_THRESHOLD: f64 = 1.0;

/// A tokenizer and CLIP text model pair turning prompts into embeddings.
struct TextEncoder {
    tokenizer: Tokenizer,
    model: ClipTextTransformer,
    pad_id: u32,
    max_len: usize,
}

impl TextEncoder {
    fn load(
        args: &Args,
        sd_config: &StableDiffusionConfig,
        device: &Device,
        first: bool,
    ) -> Result<Self> {
        let version = args.sd_version;
        let (tokenizer_file, tokenizer) = if first {
            (ModelFile::Tokenizer, args.tokenizer.clone())
        } else {
            (ModelFile::Tokenizer2, args.tokenizer2.clone())
        };
        let tokenizer = tokenizer_file.get(tokenizer, version, args.use_f16)?;
        let tokenizer = Tokenizer::from_file(tokenizer).map_err(E::msg)?;

        let clip_config = if first {
            &sd_config.clip
        } else {
            sd_config
                .clip2
                .as_ref()
                .ok_or_else(|| E::msg("model has no second text encoder"))?
        };
        let pad_token = clip_config
            .pad_with
            .clone()
            .unwrap_or_else(|| "<|endoftext|>".to_string());
        let pad_id = *tokenizer
            .get_vocab(true)
            .get(pad_token.as_str())
            .ok_or(Error::MissingPadToken(pad_token))?;

        tracing::info!(first, "building the clip transformer");
        let (clip_file, clip_weights) = if first {
            (ModelFile::Clip, args.clip_weights.clone())
        } else {
            (ModelFile::Clip2, args.clip2_weights.clone())
        };
        let clip_weights = clip_file.get(clip_weights, version, false)?;
        let model = build_clip_transformer(clip_config, clip_weights, device, DType::F32)?;

        Ok(Self {
            tokenizer,
            model,
            pad_id,
            max_len: clip_config.max_position_embeddings,
        })
    }

    fn tokens(&self, text: &str, device: &Device) -> Result<Tensor> {
        let mut tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(E::msg)?
            .get_ids()
            .to_vec();
        tokens.truncate(self.max_len);
        while tokens.len() < self.max_len {
            tokens.push(self.pad_id)
        }
        Ok(Tensor::new(tokens.as_slice(), device)?.unsqueeze(0)?)
    }

    /// Embeds `prompt`, prefixed by the empty-prompt embedding when guidance
    /// is in use.
    fn embed(&self, prompt: &str, guided: bool, device: &Device, dtype: DType) -> Result<Tensor> {
        let text_embeddings = self.model.forward(&self.tokens(prompt, device)?)?;
        let text_embeddings = if guided {
            let uncond_embeddings = self.model.forward(&self.tokens("", device)?)?;
            Tensor::cat(&[uncond_embeddings, text_embeddings], 0)?
        } else {
            text_embeddings
        };
        Ok(text_embeddings.to_dtype(dtype)?)
    }
}

/// Stable diffusion text-to-image pipeline with every sub-model loaded once.
pub struct DiffusionPipeline {
    version: StableDiffusionVersion,
    dtype: DType,
    sd_config: StableDiffusionConfig,
    encoders: Vec<TextEncoder>,
    vae: AutoEncoderKL,
    unet: UNet2DConditionModel,
    device: Device,
    device_label: &'static str,
}

impl DiffusionPipeline {
    pub fn new(args: &Args) -> Result<Self> {
        let dtype = if args.use_f16 { DType::F16 } else { DType::F32 };
        let version = args.sd_version;
        let sd_config = version.config(args.sliced_attention_size, args.height, args.width);
        let device = device(args.cpu)?;

        let mut encoders = vec![TextEncoder::load(args, &sd_config, &device, true)?];
        if version.has_second_encoder() {
            encoders.push(TextEncoder::load(args, &sd_config, &device, false)?);
        }

        tracing::info!("building the autoencoder");
        let vae_weights = ModelFile::Vae.get(args.vae_weights.clone(), version, args.use_f16)?;
        let vae = sd_config.build_vae(vae_weights, &device, dtype)?;

        tracing::info!("building the unet");
        let unet_weights =
            ModelFile::Unet.get(args.unet_weights.clone(), version, args.use_f16)?;
        let unet = sd_config.build_unet(unet_weights, &device, 4, args.use_flash_attn, dtype)?;

        let device_label = device_label(&device);
        tracing::info!(
            model = version.display_name(),
            device = device_label,
            height = sd_config.height,
            width = sd_config.width,
            "model loaded"
        );

        Ok(Self {
            version,
            dtype,
            sd_config,
            encoders,
            vae,
            unet,
            device,
            device_label,
        })
    }

    fn text_embeddings(&self, prompt: &str, guided: bool) -> Result<Tensor> {
        let text_embeddings = self
            .encoders
            .iter()
            .map(|encoder| encoder.embed(prompt, guided, &self.device, self.dtype))
            .collect::<Result<Vec<_>>>()?;
        Ok(Tensor::cat(&text_embeddings, D::Minus1)?)
    }

    fn decode(&self, latents: &Tensor) -> Result<RgbImage> {
        let image = self.vae.decode(&(latents / self.version.vae_scale())?)?;
        let image = ((image / 2.)? + 0.5)?.to_device(&Device::Cpu)?;
        let image = (image.clamp(0f32, 1.)? * 255.)?.to_dtype(DType::U8)?.i(0)?;
        tensor_to_image(&image)
    }
}

impl TextToImage for DiffusionPipeline {
    fn generate(
        &self,
        request: &GenerationRequest,
        on_step: &mut dyn FnMut(usize, usize),
    ) -> Result<RgbImage> {
        let guidance = request.guidance as f64;
        let guided = guidance > GUIDANCE_THRESHOLD;
        tracing::info!(prompt = %request.prompt, steps = request.steps, guidance, "running diffusion");

        let text_embeddings = self.text_embeddings(&request.prompt, guided)?;
        let mut scheduler = self.sd_config.build_scheduler(request.steps as usize)?;
        let timesteps = scheduler.timesteps().to_vec();

        let latents = Tensor::randn(
            0f32,
            1f32,
            (1, 4, self.sd_config.height / 8, self.sd_config.width / 8),
            &self.device,
        )?;
        // scale the initial noise by the standard deviation required by the scheduler
        let mut latents = (latents * scheduler.init_noise_sigma())?.to_dtype(self.dtype)?;

        for (timestep_index, &timestep) in timesteps.iter().enumerate() {
            let start_time = std::time::Instant::now();
            let latent_model_input = if guided {
                Tensor::cat(&[&latents, &latents], 0)?
            } else {
                latents.clone()
            };
            let latent_model_input = scheduler.scale_model_input(latent_model_input, timestep)?;
            let noise_pred =
                self.unet
                    .forward(&latent_model_input, timestep as f64, &text_embeddings)?;
            let noise_pred = if guided {
                let noise_pred = noise_pred.chunk(2, 0)?;
                let (noise_pred_uncond, noise_pred_text) = (&noise_pred[0], &noise_pred[1]);
                (noise_pred_uncond + ((noise_pred_text - noise_pred_uncond)? * guidance)?)?
            } else {
                noise_pred
            };
            latents = scheduler.step(&noise_pred, timestep, &latents)?;

            tracing::debug!(
                "step {}/{} done, {:.2}s",
                timestep_index + 1,
                timesteps.len(),
                start_time.elapsed().as_secs_f32()
            );
            on_step(timestep_index + 1, timesteps.len());
        }

        self.decode(&latents)
    }

    fn device_label(&self) -> &str {
        self.device_label
    }

    fn model_label(&self) -> &str {
        self.version.display_name()
    }
}
