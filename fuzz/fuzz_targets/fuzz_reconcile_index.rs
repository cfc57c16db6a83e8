#![no_main]

use libfuzzer_sys::fuzz_target;
use weave_runtime::plan_by_index;

fuzz_target!(|lens: (u8, u8)| {
    let (old_len, new_len) = (usize::from(lens.0), usize::from(lens.1));
    let script = plan_by_index(old_len, new_len);
    assert_eq!(
        script.replay_new_indices(old_len),
        Some((0..new_len).collect::<Vec<_>>())
    );
    assert_eq!(script.creates(), new_len.saturating_sub(old_len));
    assert_eq!(script.destroys(), old_len.saturating_sub(new_len));
    assert_eq!(script.moves(), 0);
});
