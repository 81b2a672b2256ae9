mod common;

use std::time::Duration;

use common::Cluster;

#[tokio::test]
async fn restarted_peer_resumes_without_replaying_already_applied_entries() {
    let mut cluster = Cluster::new(3);

    let leader = cluster.wait_for_one_leader(Duration::from_secs(2)).await.expect("a leader should be elected");
    cluster.nodes[leader].start("x".to_string()).await;
    cluster.nodes[leader].start("y".to_string()).await;

    assert!(cluster.wait_for_applied_count(&[0, 1, 2], 2, Duration::from_secs(2)).await);

    let restarted = (leader + 1) % 3;
    let (term_before, _) = cluster.nodes[restarted].get_state().await;

    cluster.restart(restarted);

    let (term_after, _) = cluster.nodes[restarted].get_state().await;
    assert!(term_after >= term_before, "currentTerm must never regress across a restart");

    assert!(
        cluster.wait_for_applied_count(&[0, 1, 2], 2, Duration::from_secs(2)).await,
        "the cluster should keep committing after one peer restarts"
    );

    let before_new_commands = cluster.applied[restarted].lock().unwrap().len();

    let new_leader = cluster.wait_for_one_leader(Duration::from_secs(2)).await.expect("a leader after restart");
    cluster.nodes[new_leader].start("z".to_string()).await;

    assert!(cluster.wait_for_applied_count(&[0, 1, 2], 3, Duration::from_secs(2)).await);
    assert_eq!(cluster.applied_commands(restarted), vec!["x".to_string(), "y".to_string(), "z".to_string()]);

    let after_new_commands = cluster.applied[restarted].lock().unwrap().len();
    assert!(
        after_new_commands > before_new_commands,
        "the restarted peer should resume applying from where it left off, not from scratch"
    );
}
