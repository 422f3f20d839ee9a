use std::sync::Arc;

use terralink_state::{ProfileSource, StateConfig, StateManager, SystemClock};

use crate::cmd::ProfilesArgs;
use crate::exit::{profile_error, CliResult, SUCCESS};
use crate::output::{print_state, OutputFormat};

pub fn run(args: ProfilesArgs, format: OutputFormat) -> CliResult<i32> {
    let state = StateManager::new(StateConfig::default(), Arc::new(SystemClock::new()));
    let source = state
        .reload_profiles(args.dir.as_deref())
        .map_err(|err| profile_error("profile load failed", err))?;

    let label = match &source {
        ProfileSource::Directory { path, count } => format!("{} ({count} profiles)", path.display()),
        ProfileSource::BuiltIn { count } => format!("built-in ({count} profiles)"),
    };
    print_state(&state.snapshot(), &label, format);
    Ok(SUCCESS)
}
