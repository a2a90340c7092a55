//! Random peer selection for gossip fan-out.

use std::collections::HashSet;

use rand::Rng;

use crate::membership::Member;

/// Pick up to `count` members uniformly at random, excluding any member
/// whose name appears in `exclude`. A member is never selected twice.
///
/// This is a rejection-sampling loop bounded by `5 * members.len()`
/// iterations, so it can return fewer than `count` members on unlucky
/// draws; callers must tolerate a short result. The exclusion filter alone
/// decides eligibility, names in `exclude` that are not in `members` have
/// no effect.
pub fn select_peers(count: usize, members: &[Member], exclude: &[&str]) -> Vec<Member> {
    let mut selected = Vec::new();
    if members.is_empty() || count == 0 {
        return selected;
    }

    let mut excluded: HashSet<&str> = exclude.iter().copied().collect();
    let mut rng = rand::thread_rng();

    for _ in 0..members.len() * 5 {
        if selected.len() >= count {
            break;
        }

        let member = &members[rng.gen_range(0..members.len())];
        if excluded.contains(member.name.as_str()) {
            continue;
        }

        excluded.insert(member.name.as_str());
        selected.push(member.clone());
    }

    selected
}
