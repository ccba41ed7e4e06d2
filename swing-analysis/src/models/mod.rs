pub mod angles;
pub mod com;
pub mod features;
pub mod keypoint;
pub mod report;
pub mod result;

pub use angles::{AngleFeature, AngleRecord};
pub use com::{ComMovement, ComPoint, ComRange, StabilitySummary};
pub use features::{FeatureRow, FEATURE_COUNT};
pub use keypoint::{
    CoordinateSpace, Joint, Keypoint, KeypointFrame, KeypointSchema, KeypointTable,
    COCO_CONNECTIONS, JOINT_COUNT,
};
pub use report::{AngleEntry, AngleReport, ComFrame, StabilityScore};
pub use result::{
    AnalysisStatus, ClassifierOutput, ErrorRecord, ResultRecord, REQUIRED_RESULT_KEYS,
    RESULT_VERSION,
};
