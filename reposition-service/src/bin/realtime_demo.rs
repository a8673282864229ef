//! Terminal demo: run a dry-run analysis and print staged progress live.
//!
//! Usage: `realtime_demo ["disease or pathology description"]`

use reposition_flow::{
    AnalysisRunner, AnalysisStatus, EngineConfig, SessionRegistry, SimulatedReasoningClient,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .compact()
        .init();

    let input = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Parkinson's disease".to_string());

    let registry = Arc::new(SessionRegistry::new());
    let client = Arc::new(SimulatedReasoningClient::new());
    let runner = AnalysisRunner::new(
        registry.clone(),
        client.clone(),
        client,
        EngineConfig::default(),
    );

    let session_id = runner.start_analysis(&input, true)?;
    println!("Session {session_id}");
    println!("Analyzing: {input}\n");

    let (_, mut rx) = registry.subscribe(&session_id)?;
    while let Some(event) = rx.recv().await {
        println!("[stage {} | {:>3}%] {}", event.stage, event.percent, event.message);
    }

    match registry.get_result(&session_id)? {
        AnalysisStatus::Completed(result) => {
            println!("\nDisease: {}", result.molecular_analysis.disease_name);
            for (category, markers) in &result.molecular_analysis.molecular_markers {
                println!("  {category}: {}", markers.join(", "));
            }

            if result.candidates.is_empty() {
                println!("\nNo qualifying repositioning candidates were found.");
            } else {
                println!("\nRepositioning candidates:");
                for (i, candidate) in result.candidates.iter().enumerate() {
                    println!("{}. {} ({:?})", i + 1, candidate.drug_name, candidate.approval_status);
                    println!("   Current uses: {}", candidate.current_applications.join(", "));
                    println!("   Rationale: {}", candidate.molecular_rationale);
                    println!("   Shared pathology: {}", candidate.shared_pathology);
                }
            }

            println!("\nFilter analysis:\n{}", result.filter_analysis);
        }
        AnalysisStatus::Failed(detail) => {
            println!("\nAnalysis failed [{}]: {}", detail.kind, detail.message);
        }
        AnalysisStatus::Pending { state } => {
            println!("\nAnalysis still pending in state {state:?}");
        }
    }

    Ok(())
}
