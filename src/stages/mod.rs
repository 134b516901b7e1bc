use crate::{
    config::{ChainConfig, StageConfig},
    pipeline_processing::{
        chain_context::ChainContext,
        effect_chain::EffectChain,
        frame::TextureInfo,
        shader_program::ShaderProgram,
        task_executor::SerialExecutor,
    },
};
use anyhow::Result;
use effect::{FrameCounter, Passthrough, SimulatedLoad};
use single_texture::SingleTextureShaderProgram;
use sink::{CollectingSink, SinkEvent};
use source::TexturePoolSource;
use std::{sync::Arc, time::Duration};

pub mod effect;
pub mod single_texture;
pub mod sink;
pub mod source;

pub fn shader_program_from_config(
    config: &StageConfig,
    output_texture: TextureInfo,
    context: &ChainContext,
) -> Arc<dyn ShaderProgram> {
    match config {
        StageConfig::Passthrough => {
            Arc::new(SingleTextureShaderProgram::new(Passthrough, output_texture, context))
        }
        StageConfig::FrameCounter { name } => {
            let name =
                name.clone().unwrap_or_else(|| format!("stage {}", output_texture.texture_id));
            Arc::new(SingleTextureShaderProgram::new(
                FrameCounter::new(&name),
                output_texture,
                context,
            ))
        }
        StageConfig::SimulatedLoad { micros } => Arc::new(SingleTextureShaderProgram::new(
            SimulatedLoad { duration: Duration::from_micros(*micros) },
            output_texture,
            context,
        )),
    }
}

pub struct AssembledChain {
    pub chain: EffectChain,
    pub source: Arc<TexturePoolSource>,
    pub sink: Arc<CollectingSink>,
    pub events: flume::Receiver<SinkEvent>,
}

pub fn assemble_chain(
    config: &ChainConfig,
    executor: Arc<dyn SerialExecutor>,
) -> Result<AssembledChain> {
    config.validate()?;
    let (width, height) = (config.source.width, config.source.height);
    let texture = |id: u32| TextureInfo::new(id, id, width, height);

    let context = ChainContext::new(executor);
    let pool_size = config.source.pool_size;
    let stages = config
        .stages
        .iter()
        .zip(pool_size + 1..)
        .map(|(stage, id)| shader_program_from_config(stage, texture(id), &context))
        .collect();
    let chain = EffectChain::new(stages, context.executor().clone())?;

    let source_textures = (1..=pool_size).map(texture).collect();
    let source = Arc::new(TexturePoolSource::new(source_textures, &context));
    let (sink, events) = CollectingSink::new(&context);
    chain.connect_input(source.clone());
    chain.connect_output(sink.clone());

    Ok(AssembledChain { chain, source, sink, events })
}
