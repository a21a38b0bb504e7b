//! Which actions the user may perform right now.

use serde::Serialize;
use std::fmt;

use filedeck_api::ServerConfig;
use filedeck_common::{Error, Result};

use crate::selection::Selection;

/// A gated user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Upload,
    CopyLink,
    Rename,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Create => "create",
            Action::Upload => "upload",
            Action::CopyLink => "copy link",
            Action::Rename => "rename",
            Action::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Enabled flags for every gated action. All disabled by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Actions {
    pub can_create: bool,
    pub can_upload: bool,
    pub can_copy_link: bool,
    pub can_rename: bool,
    pub can_delete: bool,
}

impl Actions {
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Create => self.can_create,
            Action::Upload => self.can_upload,
            Action::CopyLink => self.can_copy_link,
            Action::Rename => self.can_rename,
            Action::Delete => self.can_delete,
        }
    }

    /// # Errors
    /// - `NotPermitted` if `action` is disabled
    pub fn require(&self, action: Action) -> Result<()> {
        if self.allows(action) {
            Ok(())
        } else {
            Err(Error::NotPermitted(format!("Cannot {} right now", action)))
        }
    }
}

/// Derive the enabled actions. Pure: same inputs, same output.
///
/// - Full access (login not required, or authenticated): create and upload
///   need an empty selection, copy link exactly one file, rename exactly
///   one entry, delete at least one entry.
/// - Guest access (anonymous allowed, unauthenticated): only copy link.
/// - Otherwise nothing is enabled.
pub fn evaluate(config: &ServerConfig, authenticated: bool, selection: &Selection) -> Actions {
    let copy_link = selection.single_file().is_some();

    if !config.login_required || authenticated {
        Actions {
            can_create: selection.is_empty(),
            can_upload: selection.is_empty(),
            can_copy_link: copy_link,
            can_rename: selection.single().is_some(),
            can_delete: !selection.is_empty(),
        }
    } else if config.anonymous_allowed {
        Actions {
            can_copy_link: copy_link,
            ..Actions::default()
        }
    } else {
        Actions::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectedEntry;
    use filedeck_common::EntryId;
    use proptest::prelude::*;

    fn selected(id: &str, is_directory: bool) -> SelectedEntry {
        SelectedEntry {
            id: EntryId::new(id).unwrap(),
            name: id.to_string(),
            is_directory,
            parent_id: None,
        }
    }

    fn config(login_required: bool, anonymous_allowed: bool) -> ServerConfig {
        ServerConfig {
            login_required,
            anonymous_allowed,
        }
    }

    #[test]
    fn test_empty_selection_full_access() {
        let actions = evaluate(&config(false, false), false, &Selection::default());
        assert_eq!(
            actions,
            Actions {
                can_create: true,
                can_upload: true,
                can_copy_link: false,
                can_rename: false,
                can_delete: false,
            }
        );
    }

    #[test]
    fn test_single_file_selected() {
        let selection = Selection::new(vec![selected("f", false)]);
        let actions = evaluate(&config(true, false), true, &selection);
        assert!(!actions.can_create);
        assert!(!actions.can_upload);
        assert!(actions.can_copy_link);
        assert!(actions.can_rename);
        assert!(actions.can_delete);
    }

    #[test]
    fn test_single_directory_cannot_be_linked() {
        let selection = Selection::new(vec![selected("d", true)]);
        let actions = evaluate(&config(false, false), false, &selection);
        assert!(!actions.can_copy_link);
        assert!(actions.can_rename);
    }

    #[test]
    fn test_mixed_selection() {
        let selection = Selection::new(vec![selected("d", true), selected("f", false)]);
        let actions = evaluate(&config(false, false), false, &selection);
        assert!(actions.can_delete);
        assert!(!actions.can_rename);
        assert!(!actions.can_copy_link);
        assert!(!actions.can_create);
    }

    #[test]
    fn test_guest_is_read_only() {
        let selection = Selection::new(vec![selected("f", false)]);
        let actions = evaluate(&config(true, true), false, &selection);
        assert_eq!(
            actions,
            Actions {
                can_copy_link: true,
                ..Actions::default()
            }
        );

        let actions = evaluate(&config(true, true), false, &Selection::default());
        assert_eq!(actions, Actions::default());
    }

    #[test]
    fn test_locked_out_disables_everything() {
        let selection = Selection::new(vec![selected("f", false)]);
        assert_eq!(evaluate(&config(true, false), false, &selection), Actions::default());
        assert_eq!(
            evaluate(&config(true, false), false, &Selection::default()),
            Actions::default()
        );
    }

    #[test]
    fn test_require_reports_not_permitted() {
        let actions = Actions::default();
        let err = actions.require(Action::CopyLink).unwrap_err();
        assert!(matches!(err, Error::NotPermitted(m) if m == "Cannot copy link right now"));
        assert!(Actions {
            can_delete: true,
            ..Actions::default()
        }
        .require(Action::Delete)
        .is_ok());
    }

    fn arb_selection() -> impl Strategy<Value = Selection> {
        prop::collection::vec(any::<bool>(), 0..6).prop_map(|kinds| {
            Selection::new(
                kinds
                    .into_iter()
                    .enumerate()
                    .map(|(i, is_directory)| selected(&format!("e{}", i), is_directory))
                    .collect(),
            )
        })
    }

    proptest! {
        #[test]
        fn test_evaluate_is_pure(
            login_required in any::<bool>(),
            anonymous_allowed in any::<bool>(),
            authenticated in any::<bool>(),
            selection in arb_selection(),
        ) {
            let config = config(login_required, anonymous_allowed);
            let first = evaluate(&config, authenticated, &selection);
            let second = evaluate(&config, authenticated, &selection.clone());
            prop_assert_eq!(first, second);
        }

        #[test]
        fn test_rules_hold(
            login_required in any::<bool>(),
            anonymous_allowed in any::<bool>(),
            authenticated in any::<bool>(),
            selection in arb_selection(),
        ) {
            let actions = evaluate(&config(login_required, anonymous_allowed), authenticated, &selection);
            let full = !login_required || authenticated;

            prop_assert_eq!(actions.can_create, full && selection.is_empty());
            prop_assert_eq!(actions.can_upload, full && selection.is_empty());
            prop_assert_eq!(actions.can_rename, full && selection.len() == 1);
            prop_assert_eq!(actions.can_delete, full && !selection.is_empty());
            prop_assert_eq!(
                actions.can_copy_link,
                (full || anonymous_allowed) && selection.single_file().is_some()
            );
        }
    }
}
