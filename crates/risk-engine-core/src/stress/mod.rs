pub mod engine;
pub mod factors;
pub mod presets;
pub mod sensitivity;

pub use engine::{
    AssetClassImpact, AssetStressImpact, StressResult, StressRiskMetrics, StressScenarioEngine,
    StressTestOutput,
};
pub use factors::{FactorShocks, ScenarioType, ShockUnit, StressFactor, StressScenario};
pub use presets::{preset, preset_scenarios};
pub use sensitivity::SensitivityTable;
