pub mod analyzer;
pub mod compare;
pub mod driver;
pub mod gateway;
pub mod ollama;
pub mod parser;
pub mod pipeline;
pub mod ports;
pub mod screenshot;

#[cfg(test)]
mod testing;

pub use analyzer::ProfileAnalyzer;
pub use compare::ImageComparator;
pub use driver::{EngagementDriver, EngagementReport, EngagementState};
pub use gateway::{
    GatewayError, GenerateRequest, ImageInput, ModelGateway, ProviderRequest, RetryPolicy,
    TextModelProvider,
};
pub use ollama::OllamaProvider;
pub use parser::{ResponseParseError, ResponseParser};
pub use pipeline::{PipelineOrchestrator, ProfileOutcome};
pub use ports::{Device, InputDevice, Pause, ScreenCapture, TextRecognizer, ThreadPause};
pub use screenshot::{ProfileScreenshotSequence, ScreenshotRef};
