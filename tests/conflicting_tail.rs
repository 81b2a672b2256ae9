mod common;

use std::time::Duration;

use common::Cluster;

/// An isolated leader keeps accepting commands into its own log, but since it
/// can reach no one they never commit. A new leader elected among the
/// remaining majority commits a different tail at the same indices; once the
/// old leader rejoins it must discard its uncommitted entries and converge
/// on the majority's sequence rather than double-apply or diverge.
#[tokio::test]
async fn isolated_leaders_uncommitted_tail_is_discarded_on_rejoin() {
    let cluster = Cluster::new(3);

    let old_leader = cluster.wait_for_one_leader(Duration::from_secs(2)).await.expect("initial leader");
    cluster.disconnect(old_leader);

    let (index_a, _, accepted) = cluster.nodes[old_leader].start("A".to_string()).await;
    assert!(accepted);
    assert_eq!(index_a, 1);
    let (index_b, _, accepted) = cluster.nodes[old_leader].start("B".to_string()).await;
    assert!(accepted);
    assert_eq!(index_b, 2);

    let remaining: Vec<usize> = (0..3).filter(|&i| i != old_leader).collect();
    let new_leader = loop {
        let leaders = cluster.leaders().await;
        if let Some(&l) = leaders.iter().find(|l| remaining.contains(l)) {
            break l;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    let (index_c, _, accepted) = cluster.nodes[new_leader].start("C".to_string()).await;
    assert!(accepted);
    assert_eq!(index_c, 1);
    let (index_d, _, accepted) = cluster.nodes[new_leader].start("D".to_string()).await;
    assert!(accepted);
    assert_eq!(index_d, 2);

    assert!(cluster.wait_for_applied_count(&remaining, 2, Duration::from_secs(2)).await);
    for &i in &remaining {
        assert_eq!(cluster.applied_commands(i), vec!["C".to_string(), "D".to_string()]);
    }

    cluster.reconnect(old_leader);

    assert!(
        cluster.wait_for_applied_count(&[0, 1, 2], 2, Duration::from_secs(3)).await,
        "the old leader should converge onto the majority's committed tail"
    );

    let expected = vec!["C".to_string(), "D".to_string()];
    for i in 0..3 {
        assert_eq!(cluster.applied_commands(i), expected, "peer {i} must not retain the uncommitted A/B entries");
    }
}
