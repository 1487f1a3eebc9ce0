use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

#[test]
fn test_cli_end_to_end() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "op,actor,order,seller,product,amount,quantity,note").unwrap();
    writeln!(file, "deposit, alice, , , , 1000.0, ,").unwrap();
    writeln!(file, "item, alice, o1, bob, keyboard, 300.0, 1,").unwrap();
    writeln!(file, "item, alice, o1, carol, mouse, 200.0, 1,").unwrap();
    writeln!(file, "place, alice, o1, , , , , wallet").unwrap();
    writeln!(file, "seller, bob, o1, , , , , confirmed").unwrap();
    writeln!(file, "seller, bob, o1, , , , , shipped").unwrap();
    writeln!(file, "seller, bob, o1, , , , , delivered").unwrap();
    writeln!(file, "seller, carol, o1, , , , , confirmed").unwrap();
    writeln!(file, "seller, carol, o1, , , , , shipped").unwrap();
    writeln!(file, "seller, carol, o1, , , , , delivered").unwrap();
    writeln!(file, "confirm, alice, o1, , , , ,").unwrap();

    let mut cmd = Command::new(cargo_bin!("marketpay"));
    cmd.arg(file.path());

    // 500 goods + 75 tax held; sellers paid their totals on confirm.
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("user,balance"))
        .stdout(predicate::str::contains("alice,425"))
        .stdout(predicate::str::contains("bob,300"))
        .stdout(predicate::str::contains("carol,200"));
}

#[test]
fn test_cli_cancel_refunds_in_full() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "op,actor,order,seller,product,amount,quantity,note").unwrap();
    writeln!(file, "deposit, alice, , , , 1000.0, ,").unwrap();
    writeln!(file, "item, alice, o1, bob, keyboard, 300.0, 1,").unwrap();
    writeln!(file, "place, alice, o1, , , , , wallet").unwrap();
    writeln!(file, "cancel, alice, o1, , , , , changed my mind").unwrap();

    let mut cmd = Command::new(cargo_bin!("marketpay"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("alice,1000"));
}

#[test]
fn test_cli_tax_and_shipping_flags() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "op,actor,order,seller,product,amount,quantity,note").unwrap();
    writeln!(file, "deposit, alice, , , , 1000.0, ,").unwrap();
    writeln!(file, "item, alice, o1, bob, lamp, 100.0, 1,").unwrap();
    writeln!(file, "place, alice, o1, , , , , wallet").unwrap();
    writeln!(file, "seller, bob, o1, , , , , confirmed").unwrap();
    writeln!(file, "seller, bob, o1, , , , , shipped").unwrap();
    writeln!(file, "seller, bob, o1, , , , , delivered").unwrap();
    writeln!(file, "confirm, alice, o1, , , , ,").unwrap();

    let mut cmd = Command::new(cargo_bin!("marketpay"));
    cmd.arg(file.path())
        .arg("--tax-rate")
        .arg("0.1")
        .arg("--shipping")
        .arg("10");

    // 100 goods + 10 tax + 10 shipping held. The sole seller receives
    // the goods total plus the whole delivery fee.
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("alice,880"))
        .stdout(predicate::str::contains("bob,110"));
}

#[test]
fn test_cli_seller_cancellation_reason_in_note() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "op,actor,order,seller,product,amount,quantity,note").unwrap();
    writeln!(file, "deposit, alice, , , , 1000.0, ,").unwrap();
    writeln!(file, "item, alice, o1, bob, keyboard, 300.0, 1,").unwrap();
    writeln!(file, "place, alice, o1, , , , , wallet").unwrap();
    writeln!(file, "seller, bob, o1, , , , , cancelled: out of stock").unwrap();

    let mut cmd = Command::new(cargo_bin!("marketpay"));
    cmd.arg(file.path());

    // The only seller backing out cancels the order, so the hold is
    // returned in full.
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("alice,1000"));
}
