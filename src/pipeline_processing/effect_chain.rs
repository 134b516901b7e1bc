use crate::{
    pipeline_processing::{
        shader_program::{ConsumingStage, ProducingStage, ShaderProgram},
        stage_link::StageLink,
        task_executor::SerialExecutor,
    },
    util::error::ConfigError,
};
use std::sync::Arc;
use tracing::debug;

pub type InnerLink = StageLink<dyn ShaderProgram, dyn ShaderProgram>;

/// A linear chain of shader programs with one [`StageLink`] between every two
/// adjacent programs.
///
/// Listener registration is submitted to the executor, so it happens on the
/// frame processing thread before any frame reaches the chain.
pub struct EffectChain {
    stages: Vec<Arc<dyn ShaderProgram>>,
    links: Vec<Arc<InnerLink>>,
    executor: Arc<dyn SerialExecutor>,
}

impl EffectChain {
    pub fn new(
        stages: Vec<Arc<dyn ShaderProgram>>,
        executor: Arc<dyn SerialExecutor>,
    ) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::NoStages);
        }

        let links: Vec<Arc<InnerLink>> = stages
            .windows(2)
            .map(|pair| Arc::new(StageLink::new(pair[0].clone(), pair[1].clone(), executor.clone())))
            .collect();

        for (pair, link) in stages.windows(2).zip(&links) {
            let (producer, consumer) = (pair[0].clone(), pair[1].clone());
            let link = link.clone();
            executor.submit(Box::new(move || {
                producer.set_output_listener(link.clone());
                consumer.set_input_listener(link);
                Ok(())
            }));
        }
        debug!("assembled effect chain with {} stages", stages.len());

        Ok(Self { stages, links, executor })
    }

    pub fn stages(&self) -> &[Arc<dyn ShaderProgram>] { &self.stages }

    pub fn links(&self) -> &[Arc<InnerLink>] { &self.links }

    pub fn connect_input<P: ProducingStage + 'static>(
        &self,
        producer: Arc<P>,
    ) -> Arc<StageLink<P, dyn ShaderProgram>> {
        let first = self.stages[0].clone();
        let link = Arc::new(StageLink::new(producer.clone(), first.clone(), self.executor.clone()));
        {
            let link = link.clone();
            self.executor.submit(Box::new(move || {
                producer.set_output_listener(link.clone());
                first.set_input_listener(link);
                Ok(())
            }));
        }
        link
    }

    pub fn connect_output<C: ConsumingStage + 'static>(
        &self,
        consumer: Arc<C>,
    ) -> Arc<StageLink<dyn ShaderProgram, C>> {
        let last = self.stages[self.stages.len() - 1].clone();
        let link = Arc::new(StageLink::new(last.clone(), consumer.clone(), self.executor.clone()));
        {
            let link = link.clone();
            self.executor.submit(Box::new(move || {
                last.set_output_listener(link.clone());
                consumer.set_input_listener(link);
                Ok(())
            }));
        }
        link
    }
}
