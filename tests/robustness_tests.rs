use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_malformed_csv_handling() {
    let output_path = std::path::PathBuf::from("robustness_test.csv");
    let mut wtr = csv::Writer::from_path(&output_path).unwrap();
    wtr.write_record(["op", "actor", "order", "seller", "product", "amount", "quantity", "note"])
        .unwrap();

    // Valid deposit
    wtr.write_record(["deposit", "alice", "", "", "", "100.0", "", ""])
        .unwrap();
    // Invalid op
    wtr.write_record(["teleport", "alice", "", "", "", "1.0", "", ""])
        .unwrap();
    // Missing amount for deposit (required)
    wtr.write_record(["deposit", "alice", "", "", "", "", "", ""])
        .unwrap();
    // Valid deposit again
    wtr.write_record(["deposit", "alice", "", "", "", "50.0", "", ""])
        .unwrap();
    wtr.flush().unwrap();
    drop(wtr);

    let mut cmd = Command::new(cargo_bin!("marketpay"));
    cmd.arg(&output_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading command"))
        .stderr(predicate::str::contains("Error processing command"))
        .stdout(predicate::str::contains("alice,150")); // 100.0 + 50.0

    std::fs::remove_file(output_path).ok();
}

#[test]
fn test_invalid_data_types() {
    let output_path = std::path::PathBuf::from("data_type_test.csv");
    let mut wtr = csv::Writer::from_path(&output_path).unwrap();
    wtr.write_record(["op", "actor", "order", "seller", "product", "amount", "quantity", "note"])
        .unwrap();

    // Text in amount field
    wtr.write_record(["deposit", "alice", "", "", "", "not_a_number", "", ""])
        .unwrap();
    // Fractional quantity
    wtr.write_record(["item", "alice", "o1", "bob", "lamp", "10.0", "2.5", ""])
        .unwrap();
    // Valid deposit
    wtr.write_record(["deposit", "alice", "", "", "", "5.0", "", ""])
        .unwrap();
    wtr.flush().unwrap();
    drop(wtr);

    let mut cmd = Command::new(cargo_bin!("marketpay"));
    cmd.arg(&output_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading command"))
        .stdout(predicate::str::contains("alice,5"));

    std::fs::remove_file(output_path).ok();
}

#[test]
fn test_failed_commands_do_not_halt_the_run() {
    let output_path = std::path::PathBuf::from("continue_test.csv");
    let mut wtr = csv::Writer::from_path(&output_path).unwrap();
    wtr.write_record(["op", "actor", "order", "seller", "product", "amount", "quantity", "note"])
        .unwrap();

    // Order label that was never placed
    wtr.write_record(["confirm", "alice", "ghost", "", "", "", "", ""])
        .unwrap();
    // Order the buyer cannot afford still gets placed, unpaid
    wtr.write_record(["deposit", "alice", "", "", "", "100.0", "", ""])
        .unwrap();
    wtr.write_record(["item", "alice", "o1", "bob", "amp", "900.0", "1", ""])
        .unwrap();
    wtr.write_record(["place", "alice", "o1", "", "", "", "", "wallet"])
        .unwrap();
    // Later commands keep working
    wtr.write_record(["deposit", "bob", "", "", "", "25.0", "", ""])
        .unwrap();
    wtr.flush().unwrap();
    drop(wtr);

    let mut cmd = Command::new(cargo_bin!("marketpay"));
    cmd.arg(&output_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error processing command"))
        .stdout(predicate::str::contains("alice,100"))
        .stdout(predicate::str::contains("bob,25"));

    std::fs::remove_file(output_path).ok();
}
