pub mod archive;
pub mod scan;

use crate::{Data, Error};

/// Every slash command the bot registers.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        scan::messages(),
        scan::channels(),
        scan::reactions(),
        scan::mentions(),
        scan::mentioned(),
        scan::emojis(),
        scan::words(),
        scan::repeat(),
        archive::cancel(),
        archive::archive(),
    ]
}
