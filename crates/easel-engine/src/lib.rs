pub mod artifact;
pub mod critic;
pub mod error;
mod gemini;
pub mod generator;
pub mod pipeline;
pub mod synthesizer;
mod transport;

use easel_contracts::config::{is_dryrun_model, StudioConfig};
use tracing::debug;

pub use artifact::Artifact;
pub use critic::{Critic, DryrunCritic, GeminiCritic};
pub use error::{PipelineError, PipelineWarning};
pub use generator::{DryrunGenerator, Generator, StabilityGenerator};
pub use pipeline::{
    Pipeline, PipelineOutcome, PipelineStage, RepairStatus, DEFAULT_SYSTEM_INSTRUCTION,
};
pub use synthesizer::{DryrunSynthesizer, GeminiSynthesizer, Synthesizer, SynthesizerSession};
pub use transport::error_chain_text;

pub fn synthesizer_for(config: &StudioConfig) -> Box<dyn Synthesizer> {
    let model = config.models.brain.trim();
    if is_dryrun_model(model) {
        debug!(model, "using dryrun synthesizer");
        return Box::new(DryrunSynthesizer);
    }
    Box::new(GeminiSynthesizer::new(
        model,
        config.google_api_key(),
        config.transport.request_timeout_s,
    ))
}

pub fn generator_for(config: &StudioConfig) -> Box<dyn Generator> {
    let model = config.models.painter.trim();
    if is_dryrun_model(model) {
        debug!(model, "using dryrun generator");
        return Box::new(DryrunGenerator::new(&config.generation));
    }
    Box::new(StabilityGenerator::new(
        model,
        config.generation.clone(),
        config.stability_api_key(),
        config.transport.request_timeout_s,
    ))
}

pub fn critic_for(config: &StudioConfig) -> Box<dyn Critic> {
    let model = config.visual_feedback.vlm_model.trim();
    if is_dryrun_model(model) {
        debug!(model, "using dryrun critic");
        return Box::new(DryrunCritic);
    }
    Box::new(GeminiCritic::new(
        model,
        config.google_api_key(),
        config.transport.request_timeout_s,
    ))
}

#[cfg(test)]
mod tests {
    use easel_contracts::config::StudioConfig;

    use super::{critic_for, generator_for, synthesizer_for};

    #[test]
    fn factories_pick_adapters_by_model_id() {
        let live = StudioConfig::default();
        assert_eq!(synthesizer_for(&live).name(), "gemini");
        assert_eq!(generator_for(&live).name(), "stability");
        assert_eq!(critic_for(&live).name(), "gemini");

        let offline = StudioConfig::default().with_dryrun_models();
        assert_eq!(synthesizer_for(&offline).name(), "dryrun");
        assert_eq!(generator_for(&offline).name(), "dryrun");
        assert_eq!(critic_for(&offline).name(), "dryrun");
    }
}
