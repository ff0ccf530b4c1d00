/*!
# Netwatch DevKit - test doubles for the probe engine

- `MockCollaborator`: scripted measurements with failure, stall, panic
  and cancellation injection
- `RecordingSink` and `FixedGate`
- `TestHarness` for running a cycle and asserting on its report
*/

pub mod mock_collaborator;
pub mod test_utils;

pub use mock_collaborator::{healthy_report, sample_from, Measurement, MockCollaborator};
pub use test_utils::{FixedGate, RecordingSink, TestHarness};
