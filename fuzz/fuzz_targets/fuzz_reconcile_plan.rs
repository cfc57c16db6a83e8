#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use weave_runtime::reconcile::{Edit, Placement};
use weave_runtime::plan;

/// Small key alphabet so runs hit reuse, moves and duplicates often.
#[derive(Debug, Arbitrary)]
struct Lists {
    old: Vec<u8>,
    new: Vec<u8>,
}

fuzz_target!(|lists: Lists| {
    let old: Vec<u8> = lists.old.iter().take(256).map(|k| k % 16).collect();
    let new: Vec<u8> = lists.new.iter().take(256).map(|k| k % 16).collect();

    let script = plan(&old, &new);
    assert_eq!(
        script.replay_new_indices(old.len()),
        Some((0..new.len()).collect::<Vec<_>>())
    );

    let mut handled = vec![false; old.len()];
    let mut touch = |index: usize| {
        assert!(!handled[index], "old item {index} handled twice");
        handled[index] = true;
    };
    for edit in &script.edits {
        match edit {
            Edit::Destroy { old } | Edit::Keep { old, .. } => touch(*old),
            Edit::Insert { items, .. } => {
                for placement in items {
                    if let Placement::Move { old, .. } = *placement {
                        touch(old);
                    }
                }
            }
        }
    }
    assert!(handled.iter().all(|h| *h), "every old item is kept, moved or destroyed");
});
