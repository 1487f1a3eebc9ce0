mod common;

#[test]
fn test_generate_simple_csv() {
    let output_path = std::path::PathBuf::from("test_generated.csv");
    common::generate_commands_csv(&output_path, 5).expect("Failed to generate CSV");

    let content = std::fs::read_to_string(&output_path).expect("Failed to read file");
    // Header + 5 rows = 6 lines
    assert_eq!(content.lines().count(), 6);

    std::fs::remove_file(output_path).ok();
}

#[test]
fn test_generate_csv_user_distribution() {
    let output_path = std::path::PathBuf::from("test_dist_generated.csv");
    common::generate_commands_csv(&output_path, 500).expect("Failed to generate CSV");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(&output_path)
        .expect("Failed to open CSV");

    let mut actors = std::collections::HashSet::new();
    for result in reader.records() {
        let record = result.expect("Failed to read record");
        actors.insert(record[1].to_string());
    }

    // 500 rows round-robin over 50 users covers every one of them.
    assert_eq!(actors.len(), 50);

    std::fs::remove_file(output_path).ok();
}
