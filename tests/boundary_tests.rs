mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use common::harness;
use fxledger::domain::account::Balance;
use fxledger::domain::ports::LedgerStoreBox;
use fxledger::error::LedgerError;
use fxledger::infrastructure::in_memory::InMemoryLedgerStore;
use predicates::prelude::*;
use rust_decimal_macros::dec;
use std::process::Command;

#[test]
fn test_boundary_numerical_values() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("boundary_test.csv");
    let mut wtr = csv::Writer::from_path(&output_path).unwrap();
    wtr.write_record([
        "op", "owner", "account", "quote_account", "currency", "name", "symbol", "side", "type",
        "amount", "price",
    ])
    .unwrap();
    wtr.write_record(["create", "u1", "", "", "USD", "max", "", "", "", "", ""])
        .unwrap();
    wtr.write_record(["deposit", "", "1", "", "", "", "", "", "", "9999999999999.99999999", ""])
        .unwrap();
    // Balance column would overflow
    wtr.write_record(["deposit", "", "1", "", "", "", "", "", "", "0.00000001", ""])
        .unwrap();
    wtr.flush().unwrap();
    drop(wtr);

    let mut cmd = Command::new(cargo_bin!("fxledger"));
    cmd.arg(&output_path);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "1,u1,USD,max,9999999999999.99999999,false",
        ))
        .stderr(predicate::str::contains("Error processing command: internal error"));
}

#[tokio::test]
async fn test_smallest_unit_accumulates_exactly() {
    let h = harness();
    let account = h.open("u1", "BTC").await;

    for _ in 0..10 {
        h.engine.deposit(account.id, "0.00000001").await.unwrap();
    }
    assert_eq!(
        h.engine.account(account.id).await.unwrap().balance,
        Balance::new(dec!(0.0000001))
    );
}

#[tokio::test]
async fn test_overflow_is_rolled_back() {
    let h = harness();
    let account = h.open("u1", "USD").await;
    h.engine
        .deposit(account.id, "9999999999999.99999999")
        .await
        .unwrap();
    let before = h.snapshot().await;

    let err = h.engine.deposit(account.id, "1").await.unwrap_err();
    assert!(matches!(err, LedgerError::Internal(_)));
    assert_eq!(h.snapshot().await, before);

    // Negative side of the range
    h.engine
        .withdraw(account.id, "9999999999999.99999999")
        .await
        .unwrap();
    h.engine
        .withdraw(account.id, "9999999999999.99999999")
        .await
        .unwrap();
    assert!(h.engine.withdraw(account.id, "1").await.is_err());
}

#[tokio::test]
async fn test_store_as_trait_object_across_tasks() {
    let store: LedgerStoreBox = Box::new(InMemoryLedgerStore::with_currencies(["USD"]));

    let handle = tokio::spawn(async move {
        let mut tx = store.begin().await.unwrap();
        let exists = tx.currency_exists("USD").await.unwrap();
        tx.rollback().await.unwrap();
        exists
    });

    assert!(handle.await.unwrap());
}
