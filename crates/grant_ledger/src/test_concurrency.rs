use std::sync::Arc;
use std::time::Duration;

use crate::invariants::{check_account, check_campaign};
use crate::{GrantLedger, InMemoryStore, NewCampaign, RetryPolicy, TransferError};

fn contended_ledger() -> Arc<GrantLedger<InMemoryStore>> {
    Arc::new(GrantLedger::new(
        InMemoryStore::new(Duration::from_secs(5)),
        RetryPolicy {
            max_attempts: 10,
            backoff: Duration::from_millis(1),
        },
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_never_overshoot_cap() {
    const N: i64 = 40;
    const AMOUNT: i64 = 7;
    const MAX: i64 = 100;

    let ledger = contended_ledger();
    let creator = ledger.store().insert_user("creator@example.org", 0).await;
    let camp = ledger
        .store()
        .insert_campaign(NewCampaign {
            creator_id: creator.id,
            name: "Art car".to_string(),
            description: String::new(),
            minimum_threshold: Some(50),
            maximum_threshold: Some(MAX),
        })
        .await;

    let mut donors = Vec::new();
    for i in 0..N {
        let email = format!("donor{i}@example.org");
        donors.push(ledger.store().insert_user(&email, AMOUNT).await);
    }

    let handles: Vec<_> = donors
        .iter()
        .map(|donor| {
            let ledger = Arc::clone(&ledger);
            let id = donor.id;
            tokio::spawn(async move { ledger.transfer_grant(id, camp.id, AMOUNT).await })
        })
        .collect();

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => {
                assert!(receipt.effective_amount <= AMOUNT);
                applied += receipt.effective_amount;
            }
            Err(err) => assert_eq!(err, TransferError::AlreadyFullyFunded(camp.id)),
        }
    }

    assert_eq!(applied, (N * AMOUNT).min(MAX));

    let campaign = ledger.store().campaign(camp.id).await.unwrap();
    assert_eq!(campaign.funding_total, MAX);
    assert!(campaign.fully_funded);
    assert!(campaign.minimum_funded);
    let grants = ledger.store().grants_for(camp.id).await;
    assert!(check_campaign(&campaign, &grants).is_empty());

    let mut remaining = 0;
    for donor in &donors {
        let user = ledger.store().user(donor.id).await.unwrap();
        assert!(check_account(&user).is_none());
        remaining += user.balance;
    }
    assert_eq!(remaining + applied, N * AMOUNT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_spends_never_overdraw_balance() {
    let ledger = contended_ledger();
    let actor = ledger.store().insert_user("dreamer@example.org", 10).await;

    let mut campaigns = Vec::new();
    for i in 0..8 {
        campaigns.push(
            ledger
                .store()
                .insert_campaign(NewCampaign {
                    creator_id: actor.id,
                    name: format!("Camp {i}"),
                    description: String::new(),
                    minimum_threshold: Some(1),
                    maximum_threshold: Some(100),
                })
                .await,
        );
    }

    let handles: Vec<_> = campaigns
        .iter()
        .map(|camp| {
            let ledger = Arc::clone(&ledger);
            let (actor, camp) = (actor.id, camp.id);
            tokio::spawn(async move { ledger.transfer_grant(actor, camp, 3).await })
        })
        .collect();

    let mut spent = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => spent += receipt.effective_amount,
            Err(TransferError::InsufficientBalance { .. }) => rejected += 1,
            Err(other) => panic!("unexpected rejection: {other}"),
        }
    }

    // 10 grants cover three transfers of 3; the remaining five are refused.
    assert_eq!(spent, 9);
    assert_eq!(rejected, 5);
    assert_eq!(ledger.store().user(actor.id).await.unwrap().balance, 1);
}
