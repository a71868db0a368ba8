mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::*;
use tether_core::error::RemoteError;
use tether_core::{CollectionOrder, MutationNotice, MutationOutcome, Optimistic, Row};
use tokio::task::JoinHandle;
use tokio::time::timeout;

type Controller = Optimistic<Ticket, Status>;

fn controller(list: Vec<Ticket>, remote: &Arc<GatedRemote>) -> Controller { Optimistic::with_remote(list, remote.clone()) }

fn spawn_status(controller: &Controller, id: u32, status: Status) -> JoinHandle<MutationOutcome> {
    let controller = controller.clone();
    tokio::spawn(async move { controller.apply_status(id, status).await })
}

fn spawn_remove(controller: &Controller, id: u32) -> JoinHandle<MutationOutcome> {
    let controller = controller.clone();
    tokio::spawn(async move { controller.remove_entity(id).await })
}

fn status_of(controller: &Controller, id: u32) -> Option<Status> { controller.get(&id).map(|t| t.status) }

#[tokio::test]
async fn test_status_change_commits() -> anyhow::Result<()> {
    let remote = GatedRemote::new();
    let list = controller(tickets(&[3, 2, 1]), &remote);

    let task = spawn_status(&list, 2, Status::Closed);
    remote.started(1).await;
    // visible before the remote answers
    assert_eq!(status_of(&list, 2), Some(Status::Closed));
    assert!(list.is_pending(&2));
    assert_eq!(list.pending_ids(), [2]);

    remote.settle(0, Ok(()));
    assert!(task.await?.is_committed());
    assert_eq!(status_of(&list, 2), Some(Status::Closed));
    assert!(!list.has_pending());
    assert_eq!(remote.calls(), [Call::Mutate(vec![2], Status::Closed)]);
    Ok(())
}

#[tokio::test]
async fn test_failed_status_change_restores_list() -> anyhow::Result<()> {
    let remote = GatedRemote::new();
    let before = tickets(&[3, 2, 1]);
    let list = controller(before.clone(), &remote);

    let task = spawn_status(&list, 1, Status::InProgress);
    remote.started(1).await;
    remote.settle(0, Err(RemoteError::Rejected("ticket is locked".into())));

    match task.await? {
        MutationOutcome::RolledBack(RemoteError::Rejected(message)) => assert_eq!(message, "ticket is locked"),
        other => panic!("expected a rollback, got {other:?}"),
    }
    assert_eq!(list.entities(), before);
    assert!(!list.is_pending(&1));
    Ok(())
}

#[tokio::test]
async fn test_pending_tracks_each_mutation() -> anyhow::Result<()> {
    let remote = GatedRemote::new();
    let list = controller(tickets(&[4, 3, 2, 1]), &remote);

    let first = spawn_status(&list, 1, Status::Closed);
    remote.started(1).await;
    let second = spawn_remove(&list, 3);
    remote.started(2).await;
    assert_eq!(list.pending_ids(), [1, 3]);
    assert_eq!(
        list.rows().into_iter().map(|Row { entity, pending }| (entity.id, pending)).collect::<Vec<_>>(),
        [(1, true), (2, false), (4, false)]
    );

    // settle out of order
    remote.settle(1, Ok(()));
    assert!(second.await?.is_committed());
    assert_eq!(list.pending_ids(), [1]);

    remote.settle(0, Err(RemoteError::Timeout));
    assert!(first.await?.is_rolled_back());
    assert!(!list.has_pending());
    assert_eq!(ids(&list.entities()), [1, 2, 4]);
    assert_eq!(status_of(&list, 1), Some(Status::Open));
    Ok(())
}

#[tokio::test]
async fn test_bulk_is_all_or_nothing() -> anyhow::Result<()> {
    let remote = GatedRemote::new();
    let before = tickets(&[5, 4, 3, 2, 1]);
    let list = controller(before.clone(), &remote);

    let task = {
        let list = list.clone();
        tokio::spawn(async move { list.apply_bulk([1, 3, 5], Status::Closed).await })
    };
    remote.started(1).await;
    assert_eq!(list.pending_ids(), [1, 3, 5]);
    assert_eq!(list.entities().iter().filter(|t| t.status == Status::Closed).count(), 3);

    remote.settle(0, Err(RemoteError::failed("bulk endpoint down")));
    assert!(task.await?.is_rolled_back());
    assert_eq!(list.entities(), before);
    assert!(!list.has_pending());
    assert_eq!(remote.calls(), [Call::Mutate(vec![1, 3, 5], Status::Closed)]);
    Ok(())
}

#[tokio::test]
async fn test_failed_remove_reinserts_in_sort_order() -> anyhow::Result<()> {
    let remote = GatedRemote::new();
    // most recent first
    let list = controller(tickets(&[50, 40, 30, 20]), &remote).with_order(CollectionOrder::by_key_desc(|t: &Ticket| t.created));

    let task = spawn_remove(&list, 2);
    remote.started(1).await;
    assert_eq!(ids(&list.entities()), [1, 3, 4]);
    assert!(list.is_pending(&2));

    // a fresher fetch lands while the delete is in flight
    list.reseed(vec![ticket(9, 60), ticket(1, 50), ticket(3, 30), ticket(4, 20)]);

    remote.settle(0, Err(RemoteError::Timeout));
    assert!(task.await?.is_rolled_back());
    assert_eq!(ids(&list.entities()), [9, 1, 2, 3, 4]);
    assert!(!list.is_pending(&2));
    Ok(())
}

#[tokio::test]
async fn test_failed_remove_reinserts_before_successor() -> anyhow::Result<()> {
    let remote = GatedRemote::new();
    let list = controller(tickets(&[0, 0, 0, 0]), &remote);

    let removed = spawn_remove(&list, 2);
    remote.started(1).await;
    let other = spawn_remove(&list, 1);
    remote.started(2).await;
    remote.settle(1, Ok(()));
    assert!(other.await?.is_committed());

    remote.settle(0, Err(RemoteError::failed("409")));
    assert!(removed.await?.is_rolled_back());
    assert_eq!(ids(&list.entities()), [2, 3, 4]);
    Ok(())
}

#[tokio::test]
async fn test_reseed_already_containing_removed_entity() -> anyhow::Result<()> {
    let remote = GatedRemote::new();
    let list = controller(tickets(&[3, 2, 1]), &remote);

    let task = spawn_remove(&list, 1);
    remote.started(1).await;
    list.reseed(tickets(&[3, 2, 1]));
    remote.settle(0, Err(RemoteError::Timeout));
    assert!(task.await?.is_rolled_back());
    assert_eq!(ids(&list.entities()), [1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_overlapping_mutations_on_one_id() -> anyhow::Result<()> {
    let remote = GatedRemote::new();
    let list = controller(tickets(&[1]), &remote);

    let first = spawn_status(&list, 1, Status::InProgress);
    remote.started(1).await;
    let second = spawn_status(&list, 1, Status::Closed);
    remote.started(2).await;
    assert_eq!(status_of(&list, 1), Some(Status::Closed));

    // the first settlement clears the pending mark even though the second is still running
    remote.settle(0, Ok(()));
    assert!(first.await?.is_committed());
    assert!(!list.is_pending(&1));

    // the second snapshotted the first one's optimistic state
    remote.settle(1, Err(RemoteError::Timeout));
    assert!(second.await?.is_rolled_back());
    assert_eq!(status_of(&list, 1), Some(Status::InProgress));
    Ok(())
}

#[tokio::test]
async fn test_unknown_ids_do_not_reach_remote() -> anyhow::Result<()> {
    let remote = GatedRemote::new();
    let list = controller(tickets(&[2, 1]), &remote);

    assert!(matches!(list.apply_status(7, Status::Closed).await, MutationOutcome::Ignored));
    assert!(matches!(list.remove_entity(7).await, MutationOutcome::Ignored));
    assert!(matches!(list.apply_bulk(Vec::<u32>::new(), Status::Closed).await, MutationOutcome::Ignored));
    assert!(remote.calls().is_empty());
    assert!(!list.has_pending());
    Ok(())
}

#[tokio::test]
async fn test_notices_and_signals() -> anyhow::Result<()> {
    let remote = GatedRemote::new();
    let list = controller(tickets(&[2, 1]), &remote);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let _guard = {
        let seen = seen.clone();
        list.listen_notices(move |notice| seen.lock().unwrap().push(notice))
    };
    let entities = list.entities_signal();
    let pending = list.pending_signal();

    let task = spawn_remove(&list, 1);
    remote.started(1).await;
    assert_eq!(ids(&entities.value()), [2]);
    assert!(pending.value().contains(&1));
    remote.settle(0, Ok(()));
    task.await?;

    let task = spawn_status(&list, 2, Status::Closed);
    remote.started(2).await;
    remote.settle(1, Err(RemoteError::failed("500")));
    task.await?;

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], MutationNotice::Removed { id: 1 });
    assert!(matches!(&seen[1], MutationNotice::RolledBack { ids, .. } if ids == &[2]));
    assert!(seen[1].is_failure());
    assert!(pending.value().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dropped_mutation_rolls_back() -> anyhow::Result<()> {
    let remote = GatedRemote::new();
    let before = tickets(&[3, 2, 1]);
    let list = controller(before.clone(), &remote);

    // the remote never answers, so both calls are abandoned by the timeout
    assert!(timeout(Duration::from_millis(50), list.apply_status(1, Status::Closed)).await.is_err());
    assert!(!list.has_pending());
    assert_eq!(list.entities(), before);

    assert!(timeout(Duration::from_millis(50), list.remove_entity(2)).await.is_err());
    assert!(!list.has_pending());
    assert_eq!(list.entities(), before);

    let bulk = {
        let list = list.clone();
        tokio::spawn(async move { list.apply_bulk([1, 3], Status::InProgress).await })
    };
    remote.started(3).await;
    assert_eq!(list.pending_ids(), [1, 3]);
    bulk.abort();
    assert!(bulk.await.is_err_and(|e| e.is_cancelled()));
    assert!(!list.has_pending());
    assert_eq!(list.entities(), before);

    assert_eq!(remote.calls(), [Call::Mutate(vec![1], Status::Closed), Call::Remove(2), Call::Mutate(vec![1, 3], Status::InProgress)]);
    Ok(())
}
