mod headless;

use anyhow::Result;

pub(crate) struct Options {
    pub verbose: bool,
    pub color: bool,
}

pub(crate) fn set_up(options: &Options) -> Result<()> {
    headless::HeadlessLogger {}.set_up(options)
}
