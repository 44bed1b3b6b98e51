pub mod calendar;
pub mod collectors;
mod common;
pub mod daily_ops;
pub mod drive;
pub mod free_form;
pub mod generic;
pub mod lookup;
pub mod mail;
pub mod playbooks;
pub mod registry;
pub mod repo_index;
pub mod repo_query;
pub mod research;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

pub use registry::{KeywordRule, Skill, SkillDeps, SkillRegistry, SkillRequest};

use daily_ops::DailyOpsPaths;

/// Register the full built-in skill set. Order matters: it is the keyword
/// classifier's priority order.
pub fn builtin_registry(deps: SkillDeps, daily_paths: DailyOpsPaths) -> SkillRegistry {
    let mut registry = SkillRegistry::new();
    registry.register(Arc::new(calendar::CalendarSkill::new(deps.clone())));
    registry.register(Arc::new(mail::MailSkill::new(deps.clone())));
    registry.register(Arc::new(drive::DriveSkill::new(deps.clone())));
    registry.register(Arc::new(lookup::LookupSkill::new(deps.clone())));
    registry.register(Arc::new(research::ResearchSkill::new(deps.clone())));
    registry.register(Arc::new(daily_ops::DailyOpsSkill::new(
        deps.clone(),
        daily_paths,
    )));
    registry.register(Arc::new(repo_query::RepoQuerySkill::new(deps.clone())));
    registry.register(Arc::new(generic::GenericBrowserSkill::new(deps.clone())));
    registry.register(Arc::new(free_form::FreeFormSkill::new(deps)));
    registry
}
