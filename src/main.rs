use anyhow::Result;

use foresight_scheduler::common::{
    start_application, startup_config_from_matches, CliBuilder,
};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = CliBuilder::new(
        "foresight-scheduler",
        "Predictive task scheduler: learns task durations and places work on the least-waiting worker",
    )
    .with_common_args()
    .build_and_parse();

    let startup = startup_config_from_matches(&matches);
    start_application(startup).await
}
