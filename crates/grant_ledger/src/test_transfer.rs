use std::time::Duration;

use crate::invariants::{check_account, check_campaign};
use crate::{
    Campaign, CampaignId, GrantLedger, InMemoryStore, LedgerStore, LedgerTx, NewCampaign,
    RetryPolicy, TransferError, UserAccount, UserId,
};

fn ledger() -> GrantLedger<InMemoryStore> {
    GrantLedger::new(InMemoryStore::default(), RetryPolicy::default())
}

fn new_campaign(creator: UserId, min: Option<i64>, max: Option<i64>) -> NewCampaign {
    NewCampaign {
        creator_id: creator,
        name: "Temple of Whollyness".to_string(),
        description: "A place to sit".to_string(),
        minimum_threshold: min,
        maximum_threshold: max,
    }
}

/// Fund `campaign` up to `total` from a throwaway donor.
async fn prefund(ledger: &GrantLedger<InMemoryStore>, campaign: CampaignId, total: i64) {
    let donor = ledger.store().insert_user("donor@example.org", total).await;
    let receipt = ledger
        .transfer_grant(donor.id, campaign, total)
        .await
        .unwrap();
    assert_eq!(receipt.effective_amount, total);
}

async fn state(
    ledger: &GrantLedger<InMemoryStore>,
    user: UserId,
    campaign: CampaignId,
) -> (UserAccount, Campaign) {
    (
        ledger.store().user(user).await.unwrap(),
        ledger.store().campaign(campaign).await.unwrap(),
    )
}

async fn assert_consistent(ledger: &GrantLedger<InMemoryStore>, campaign: CampaignId) {
    let camp = ledger.store().campaign(campaign).await.unwrap();
    let grants = ledger.store().grants_for(campaign).await;
    let violations = check_campaign(&camp, &grants);
    assert!(violations.is_empty(), "{violations:?}");
}

#[tokio::test]
async fn test_transfer_moves_balance_into_campaign() {
    let ledger = ledger();
    let actor = ledger.store().insert_user("dreamer@example.org", 10).await;
    let camp = ledger
        .store()
        .insert_campaign(new_campaign(actor.id, Some(5), Some(100)))
        .await;

    let receipt = ledger.transfer_grant(actor.id, camp.id, 7).await.unwrap();

    assert_eq!(receipt.requested_amount, 7);
    assert_eq!(receipt.effective_amount, 7);
    assert_eq!(receipt.actor_balance, 3);
    assert_eq!(receipt.snapshot.funding_total, 7);
    assert!(receipt.snapshot.minimum_funded);
    assert!(!receipt.snapshot.fully_funded);

    let (user, campaign) = state(&ledger, actor.id, camp.id).await;
    assert_eq!(user.balance, actor.balance - receipt.effective_amount);
    assert_eq!(campaign.funding_total, receipt.effective_amount);
    assert_eq!(campaign.snapshot(), receipt.snapshot);

    let grants = ledger.store().grants_for(camp.id).await;
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].id, receipt.grant_id);
    assert_eq!(grants[0].user_id, actor.id);
    assert_eq!(grants[0].amount, 7);
    assert_consistent(&ledger, camp.id).await;
}

#[tokio::test]
async fn test_transfer_is_capped_at_remaining_budget() {
    let ledger = ledger();
    let actor = ledger.store().insert_user("dreamer@example.org", 100).await;
    let camp = ledger
        .store()
        .insert_campaign(new_campaign(actor.id, Some(100), Some(500)))
        .await;
    prefund(&ledger, camp.id, 450).await;

    let receipt = ledger.transfer_grant(actor.id, camp.id, 100).await.unwrap();

    assert_eq!(receipt.effective_amount, 50);
    assert!(receipt.effective_amount <= receipt.requested_amount);
    assert_eq!(receipt.snapshot.funding_total, 500);
    assert!(receipt.snapshot.minimum_funded);
    assert!(receipt.snapshot.fully_funded);

    let (user, campaign) = state(&ledger, actor.id, camp.id).await;
    assert_eq!(user.balance, 50);
    assert_eq!(campaign.funding_total, 500);
    assert!(campaign.fully_funded);
    assert_consistent(&ledger, camp.id).await;
}

#[tokio::test]
async fn test_transfer_at_cap_is_already_fully_funded() {
    let ledger = ledger();
    let actor = ledger.store().insert_user("dreamer@example.org", 10).await;
    let camp = ledger
        .store()
        .insert_campaign(new_campaign(actor.id, Some(100), Some(500)))
        .await;
    prefund(&ledger, camp.id, 500).await;
    let before = state(&ledger, actor.id, camp.id).await;

    let err = ledger.transfer_grant(actor.id, camp.id, 5).await.unwrap_err();

    assert_eq!(err, TransferError::AlreadyFullyFunded(camp.id));
    assert_eq!(state(&ledger, actor.id, camp.id).await, before);
    assert_eq!(ledger.store().grants_for(camp.id).await.len(), 1);
}

#[tokio::test]
async fn test_transfer_without_maximum_is_rejected() {
    let ledger = ledger();
    let actor = ledger.store().insert_user("dreamer@example.org", 10).await;
    let camp = ledger
        .store()
        .insert_campaign(new_campaign(actor.id, Some(5), None))
        .await;
    let before = state(&ledger, actor.id, camp.id).await;

    let err = ledger.transfer_grant(actor.id, camp.id, 1).await.unwrap_err();

    assert_eq!(err, TransferError::MissingBudgetConfiguration(camp.id));
    assert_eq!(state(&ledger, actor.id, camp.id).await, before);
    assert!(ledger.store().grants_for(camp.id).await.is_empty());
}

#[tokio::test]
async fn test_transfer_beyond_balance_is_rejected() {
    let ledger = ledger();
    let actor = ledger.store().insert_user("dreamer@example.org", 10).await;
    let camp = ledger
        .store()
        .insert_campaign(new_campaign(actor.id, Some(5), Some(100)))
        .await;
    let before = state(&ledger, actor.id, camp.id).await;

    let err = ledger.transfer_grant(actor.id, camp.id, 11).await.unwrap_err();

    assert_eq!(
        err,
        TransferError::InsufficientBalance {
            requested: 11,
            available: 10
        }
    );
    assert_eq!(state(&ledger, actor.id, camp.id).await, before);
}

#[tokio::test]
async fn test_invalid_amount_is_rejected_before_lookup() {
    let ledger = ledger();
    // Neither the user nor the campaign exist; the amount check wins.
    let err = ledger
        .transfer_grant(UserId(404), CampaignId(404), 0)
        .await
        .unwrap_err();
    assert_eq!(err, TransferError::InvalidAmount { requested: 0 });
}

#[tokio::test]
async fn test_unknown_parties_are_reported() {
    let ledger = ledger();
    let actor = ledger.store().insert_user("dreamer@example.org", 10).await;
    let camp = ledger
        .store()
        .insert_campaign(new_campaign(actor.id, Some(5), Some(100)))
        .await;

    assert_eq!(
        ledger.transfer_grant(UserId(99), camp.id, 1).await,
        Err(TransferError::UserNotFound(UserId(99)))
    );
    assert_eq!(
        ledger.transfer_grant(actor.id, CampaignId(99), 1).await,
        Err(TransferError::CampaignNotFound(CampaignId(99)))
    );
}

#[tokio::test]
async fn test_flags_follow_running_total() {
    let ledger = ledger();
    let actor = ledger.store().insert_user("dreamer@example.org", 30).await;
    let camp = ledger
        .store()
        .insert_campaign(new_campaign(actor.id, Some(10), Some(20)))
        .await;

    let first = ledger.transfer_grant(actor.id, camp.id, 9).await.unwrap();
    assert!(!first.snapshot.minimum_funded);

    let second = ledger.transfer_grant(actor.id, camp.id, 1).await.unwrap();
    assert!(second.snapshot.minimum_funded);
    assert!(!second.snapshot.fully_funded);

    let third = ledger.transfer_grant(actor.id, camp.id, 15).await.unwrap();
    assert_eq!(third.effective_amount, 10);
    assert!(third.snapshot.fully_funded);

    let user = ledger.store().user(actor.id).await.unwrap();
    assert_eq!(user.balance, 10);
    assert!(check_account(&user).is_none());
    assert_consistent(&ledger, camp.id).await;
}

#[tokio::test]
async fn test_busy_when_lock_is_held() {
    let store = InMemoryStore::new(Duration::from_millis(10));
    let ledger = GrantLedger::new(
        store.clone(),
        RetryPolicy {
            max_attempts: 2,
            backoff: Duration::from_millis(1),
        },
    );
    let actor = store.insert_user("dreamer@example.org", 10).await;
    let camp = store
        .insert_campaign(new_campaign(actor.id, Some(5), Some(100)))
        .await;

    let held = store.begin().await.unwrap();
    let err = ledger.transfer_grant(actor.id, camp.id, 1).await.unwrap_err();
    assert_eq!(err, TransferError::Busy { attempts: 2 });
    assert!(err.is_retryable());
    held.abort().await.unwrap();

    // Nothing was written while contended; a retry now succeeds.
    assert_eq!(store.user(actor.id).await.unwrap().balance, 10);
    let receipt = ledger.transfer_grant(actor.id, camp.id, 1).await.unwrap();
    assert_eq!(receipt.actor_balance, 9);
}
