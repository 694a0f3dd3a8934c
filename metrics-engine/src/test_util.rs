use mockall::mock;

use crate::environment::{EnvironmentInfo, EnvironmentInfoProvider};
use crate::reporting::{ReportError, Reporter};
use crate::snapshot::MetricsSnapshot;

mock! {
    pub EnvironmentSource {}

    impl EnvironmentInfoProvider for EnvironmentSource {
        fn environment_info(&self) -> EnvironmentInfo;
    }
}

mock! {
    pub Sink {}

    impl Reporter for Sink {
        fn name(&self) -> &str;
        fn report(&self, snapshot: &MetricsSnapshot) -> Result<(), ReportError>;
    }
}
