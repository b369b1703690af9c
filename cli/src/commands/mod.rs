mod entry;
mod helpers;
mod import;
mod profile;
mod summary;
mod target;

use proteus_core::clock::SystemClock;
use proteus_core::service::ProteinService;

pub(crate) type Service = ProteinService<SystemClock>;

pub(crate) use entry::{EntryFields, cmd_add, cmd_list, cmd_remove, cmd_update};
pub(crate) use import::{cmd_export, cmd_import};
pub(crate) use profile::{ProfileUpdate, cmd_profile_set, cmd_profile_show};
pub(crate) use summary::{cmd_history, cmd_month, cmd_streak, cmd_summary, cmd_week};
pub(crate) use target::{cmd_target_history, cmd_target_set, cmd_target_show};
