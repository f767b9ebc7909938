//! Aggregate counts and batch-action eligibility derived from the items.

use std::collections::{HashMap, HashSet};

use crate::items::{Item, ItemKind, Status};

/// Keys of selected items each batch action may act on.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchActions {
    pub uploadable: Vec<String>,
    pub pullable: Vec<String>,
    pub creatable: Vec<String>,
    pub deletable: Vec<String>,
    pub abortable: Vec<String>,
    pub retryable: Vec<String>,
}

impl BatchActions {
    /// Delete is offered only while nothing selected is in flight.
    pub fn can_delete(&self) -> bool {
        !self.deletable.is_empty() && self.abortable.is_empty()
    }
}

/// Snapshot recomputed on every change to the collection or selection.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Summary {
    pub total: usize,
    pub by_status: HashMap<Status, usize>,
    pub loading: usize,
    pub fail: usize,
    pub waiting: usize,
    pub success: usize,
    pub selected: usize,
    pub is_all_selected: bool,
    pub actions: BatchActions,
}

impl Summary {
    pub fn count(&self, status: Status) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

pub fn summarize(items: &[Item], selection: &HashSet<String>) -> Summary {
    let mut by_status: HashMap<Status, usize> = HashMap::new();
    for item in items {
        *by_status.entry(item.status).or_default() += 1;
    }
    let loading = items.iter().filter(|i| i.status.is_in_flight()).count();
    let fail = items.iter().filter(|i| i.status.is_failure()).count();
    let success = by_status.get(&Status::Success).copied().unwrap_or(0);
    let waiting = items.iter().filter(|i| is_waiting(i.status)).count();
    let selected = items.iter().filter(|i| selection.contains(&i.key)).count();

    Summary {
        total: items.len(),
        by_status,
        loading,
        fail,
        waiting,
        success,
        selected,
        is_all_selected: is_all_selected(items, selection),
        actions: batch_actions(items, selection),
    }
}

/// `waiting` is a derived label: neither in flight nor finished.
pub fn is_waiting(status: Status) -> bool {
    !status.is_in_flight() && status != Status::Success
}

pub fn is_all_selected(items: &[Item], selection: &HashSet<String>) -> bool {
    !items.is_empty() && selection.len() == items.len()
}

pub fn batch_actions(items: &[Item], selection: &HashSet<String>) -> BatchActions {
    let mut actions = BatchActions::default();
    for item in items.iter().filter(|i| selection.contains(&i.key)) {
        let key = || item.key.clone();
        let s = item.status;
        let content_item = item.kind != ItemKind::Folder;

        if item.needs_upload() && matches!(s, Status::Default | Status::UploadError) {
            actions.uploadable.push(key());
        }
        if content_item && matches!(s, Status::UploadDone | Status::PullError) {
            actions.pullable.push(key());
        }
        if content_item && matches!(s, Status::PullDone | Status::Error) {
            actions.creatable.push(key());
        }
        if s != Status::Success {
            actions.deletable.push(key());
        }
        if s.is_in_flight() {
            actions.abortable.push(key());
        }
        if s.is_failure() {
            actions.retryable.push(key());
        }
    }
    actions
}

/// Selection after toggling every member of `group_key` as one unit.
///
/// Selects the whole group unless every member is already selected, in
/// which case the whole group is deselected.
pub fn toggle_group(
    items: &[Item],
    selection: &HashSet<String>,
    group_key: &str,
) -> HashSet<String> {
    let members: Vec<&String> = items
        .iter()
        .filter(|i| i.group_key.as_deref() == Some(group_key))
        .map(|i| &i.key)
        .collect();
    let all_selected = !members.is_empty() && members.iter().all(|k| selection.contains(*k));

    let mut next = selection.clone();
    for key in members {
        if all_selected {
            next.remove(key);
        } else {
            next.insert(key.clone());
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(key: &str, kind: ItemKind, status: Status) -> Item {
        Item {
            key: key.into(),
            kind,
            status,
            ..Item::default()
        }
    }

    fn select(keys: &[&str]) -> HashSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    /// Small LCG so the randomized cases are reproducible.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            self.0 >> 33
        }
    }

    #[test]
    fn counts_agree_for_random_collections() {
        let mut rng = Lcg(42);
        for round in 0..200 {
            let n = (rng.next() % 30) as usize;
            let items: Vec<Item> = (0..n)
                .map(|i| {
                    let status = Status::ALL[(rng.next() % Status::ALL.len() as u64) as usize];
                    item(&format!("{round}-{i}"), ItemKind::Other, status)
                })
                .collect();
            let s = summarize(&items, &HashSet::new());
            let c = |st| s.count(st);

            assert_eq!(s.total, n);
            assert_eq!(
                s.loading,
                c(Status::Uploading) + c(Status::Pulling) + c(Status::Creating)
            );
            assert_eq!(
                s.fail,
                c(Status::UploadError) + c(Status::PullError) + c(Status::Error)
            );
            assert_eq!(s.waiting, s.total - s.loading - s.success);
            assert_eq!(s.by_status.values().sum::<usize>(), n);
        }
    }

    #[test]
    fn all_selected_needs_a_non_empty_match() {
        assert!(!is_all_selected(&[], &HashSet::new()));
        let items = vec![item("a", ItemKind::File, Status::Default)];
        assert!(!is_all_selected(&items, &HashSet::new()));
        assert!(is_all_selected(&items, &select(&["a"])));
    }

    #[test]
    fn eligibility_only_considers_selected_items() {
        let items = vec![
            item("up", ItemKind::File, Status::Default),
            item("up-err", ItemKind::File, Status::UploadError),
            item("other", ItemKind::Other, Status::Default),
            item("pull", ItemKind::Other, Status::UploadDone),
            item("create", ItemKind::Other, Status::Error),
            item("busy", ItemKind::Other, Status::Pulling),
            item("done", ItemKind::Other, Status::Success),
            item("unselected", ItemKind::File, Status::Default),
        ];
        let sel = select(&["up", "up-err", "other", "pull", "create", "busy", "done"]);
        let a = batch_actions(&items, &sel);

        assert_eq!(a.uploadable, vec!["up", "up-err"]);
        assert_eq!(a.pullable, vec!["pull"]);
        assert_eq!(a.creatable, vec!["create"]);
        assert_eq!(a.abortable, vec!["busy"]);
        assert_eq!(a.retryable, vec!["up-err", "create"]);
        assert!(!a.deletable.contains(&"done".to_string()));
        assert!(!a.can_delete());
    }

    #[test]
    fn delete_allowed_when_nothing_in_flight() {
        let items = vec![item("a", ItemKind::File, Status::UploadError)];
        assert!(batch_actions(&items, &select(&["a"])).can_delete());
    }

    #[test]
    fn group_toggle_twice_restores_selection() {
        let mut items = vec![item("folder:g", ItemKind::Folder, Status::Default)];
        for k in ["a", "b"] {
            items.push(Item {
                group_key: Some("g".into()),
                ..item(k, ItemKind::Other, Status::UploadDone)
            });
        }
        items[0].group_key = Some("g".into());
        items.push(item("loose", ItemKind::Other, Status::UploadDone));

        for start in [select(&["loose"]), select(&["loose", "folder:g", "a", "b"])] {
            let once = toggle_group(&items, &start, "g");
            assert_ne!(once, start);
            assert!(once.contains("loose"));
            assert_eq!(toggle_group(&items, &once, "g"), start);
        }
    }

    #[test]
    fn partial_group_selection_selects_everyone() {
        let items = vec![
            Item {
                group_key: Some("g".into()),
                ..item("a", ItemKind::Other, Status::UploadDone)
            },
            Item {
                group_key: Some("g".into()),
                ..item("b", ItemKind::Other, Status::UploadDone)
            },
        ];
        assert_eq!(
            toggle_group(&items, &select(&["a"]), "g"),
            select(&["a", "b"])
        );
    }
}
