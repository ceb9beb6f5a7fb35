//! Clean command - discard a published rootfs

use crate::build::Builder;
use crate::chroot::HostChroot;
use crate::cli::args::CleanArgs;
use crate::config::Config;
use crate::error::StemmerResult;
use crate::ui::{self, UiContext};

/// Execute the clean command
pub async fn execute(args: CleanArgs, config: &Config) -> StemmerResult<()> {
    let ctx = UiContext::detect();
    let runner = HostChroot::new();
    let builder = Builder::new(config, &runner);

    if builder.discard(&args.project).await? {
        ui::step_ok(&ctx, &format!("Discarded published build of {}", args.project));
    } else {
        ui::step_info(&ctx, &format!("Nothing published for {}", args.project));
    }
    Ok(())
}
