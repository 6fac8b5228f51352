//! The six-stage design-document pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hldflow_stage_api::{CredentialProvider, StageDescriptor};
use hldflow_utils::error::RegistryError;

use super::{CommandStage, DryRunStage};
use crate::registry::StageRegistry;

pub const PDF_EXTRACTION: &str = "pdf_extraction";
pub const AUTH_INTEGRATIONS: &str = "auth_integrations";
pub const DOMAIN_API_DESIGN: &str = "domain_api_design";
pub const BEHAVIOR_QUALITY: &str = "behavior_quality";
pub const DIAGRAM_GENERATION: &str = "diagram_generation";
pub const OUTPUT_COMPOSITION: &str = "output_composition";

/// Descriptors in registration order. Only the security analysis is optional.
///
/// The three analysis stages depend only on extraction and diagram
/// generation depends on all three, so every strategy shares one graph and
/// the optimized-sequential strategy can batch the analysis stages.
#[must_use]
pub fn default_descriptors() -> Vec<StageDescriptor> {
    vec![
        StageDescriptor::new(
            PDF_EXTRACTION,
            "Extract text, tables and structure from the requirements PDF",
        ),
        StageDescriptor::new(
            AUTH_INTEGRATIONS,
            "Identify actors, authentication flows and external integrations",
        )
        .non_critical()
        .depends_on([PDF_EXTRACTION]),
        StageDescriptor::new(
            DOMAIN_API_DESIGN,
            "Model domain entities and derive the API surface",
        )
        .depends_on([PDF_EXTRACTION]),
        StageDescriptor::new(
            BEHAVIOR_QUALITY,
            "Describe runtime behavior and quality attributes",
        )
        .depends_on([PDF_EXTRACTION]),
        StageDescriptor::new(DIAGRAM_GENERATION, "Generate architecture diagrams")
            .depends_on([AUTH_INTEGRATIONS, DOMAIN_API_DESIGN, BEHAVIOR_QUALITY]),
        StageDescriptor::new(OUTPUT_COMPOSITION, "Compose the final design document")
            .depends_on([DIAGRAM_GENERATION]),
    ]
}

/// Per-stage credential variables; stages not listed use the fallback.
#[must_use]
pub fn default_credential_env() -> BTreeMap<String, String> {
    [
        (PDF_EXTRACTION, "GEMINI_API_KEY_4"),
        (AUTH_INTEGRATIONS, "GEMINI_API_KEY_1"),
        (BEHAVIOR_QUALITY, "GEMINI_API_KEY_2"),
        (DOMAIN_API_DESIGN, "GEMINI_API_KEY_3"),
    ]
    .into_iter()
    .map(|(stage, var)| (stage.to_string(), var.to_string()))
    .collect()
}

/// The default pipeline with every stage in dry-run mode.
///
/// # Errors
///
/// Only if the built-in names collide, which they do not.
pub fn dry_run_registry() -> Result<StageRegistry, RegistryError> {
    let mut registry = StageRegistry::new();
    for descriptor in default_descriptors() {
        registry.register(DryRunStage::new(descriptor))?;
    }
    Ok(registry)
}

/// The default pipeline with every stage delegated to one analyzer program.
///
/// # Errors
///
/// Only if the built-in names collide, which they do not.
pub fn command_registry(
    program: PathBuf,
    args: &[String],
    timeout: Duration,
    credentials: Arc<dyn CredentialProvider>,
) -> Result<StageRegistry, RegistryError> {
    let mut registry = StageRegistry::new();
    for descriptor in default_descriptors() {
        registry.register(CommandStage::new(
            descriptor,
            program.clone(),
            args.to_vec(),
            timeout,
            Arc::clone(&credentials),
        ))?;
    }
    Ok(registry)
}
