//! CSV upload into a fresh database, then overview statistics and a
//! translated question over the uploaded table.

use async_trait::async_trait;
use std::path::PathBuf;
use tabletalk::llm::CompletionService;
use tabletalk::prompt::ChatMessage;
use tabletalk::result::CellValue;
use tabletalk::schema::introspect;
use tabletalk::store::stats::{histogram, numeric_columns, table_statistics, DEFAULT_BINS};
use tabletalk::store::{DataStore, SqliteStore};
use tabletalk::{Result, Session, Translator};

const SALES_CSV: &str = "\
region,units,price,note
north,10,2.5,
south,4,3,promo
north,7,2.5,
east,,4.25,late
";

struct Fixed(&'static str);

#[async_trait]
impl CompletionService for Fixed {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        Ok(self.0.to_string())
    }
}

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tabletalk-upload-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_upload_replaces_existing_tables() {
    let dir = temp_dir();
    let db_path = dir.join("db").join("uploaded.db");
    let csv_path = dir.join("sales.csv");
    std::fs::write(&csv_path, SALES_CSV).unwrap();

    let store = SqliteStore::create(&db_path).unwrap();
    store
        .replace_with_csv_reader("a,b\n1,2\n".as_bytes(), "stale")
        .unwrap();

    let summary = store.replace_with_csv(&csv_path, "sales").unwrap();
    assert_eq!(summary.table_name, "sales");
    assert_eq!(summary.row_count, 4);

    assert_eq!(store.list_user_tables().unwrap(), vec!["sales"]);
    let types: Vec<(String, String)> = store
        .describe_table("sales")
        .unwrap()
        .into_iter()
        .map(|c| (c.name, c.data_type))
        .collect();
    assert_eq!(
        types,
        vec![
            ("region".to_string(), "TEXT".to_string()),
            ("units".to_string(), "INTEGER".to_string()),
            ("price".to_string(), "REAL".to_string()),
            ("note".to_string(), "TEXT".to_string()),
        ]
    );

    let schema = introspect(&store).unwrap();
    assert!(schema.render().contains("\"units\" INTEGER"));
}

#[test]
fn test_overview_statistics_and_distributions() {
    let dir = temp_dir();
    let store = SqliteStore::create(dir.join("uploaded.db")).unwrap();
    store
        .replace_with_csv_reader(SALES_CSV.as_bytes(), "sales")
        .unwrap();

    let stats = table_statistics(&store, "sales").unwrap();
    let units = stats.iter().find(|s| s.column == "units").unwrap();
    assert_eq!(units.total_rows, 4);
    assert_eq!(units.unique_values, 3);
    assert_eq!(units.missing_values, 1);
    let region = stats.iter().find(|s| s.column == "region").unwrap();
    assert_eq!(region.unique_values, 3);
    assert_eq!(region.missing_values, 0);

    let numeric = numeric_columns(&store).unwrap();
    let names: Vec<&str> = numeric.iter().map(|c| c.column.as_str()).collect();
    assert_eq!(names, vec!["units", "price"]);
    assert_eq!(numeric[0].values, vec![10.0, 4.0, 7.0]);

    let bins = histogram(&numeric[1].values, DEFAULT_BINS);
    assert_eq!(bins.len(), DEFAULT_BINS);
    assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 4);
}

#[tokio::test]
async fn test_question_over_uploaded_table() {
    let dir = temp_dir();
    let store = SqliteStore::create(dir.join("uploaded.db")).unwrap();
    store
        .replace_with_csv_reader(SALES_CSV.as_bytes(), "sales")
        .unwrap();

    let translator = Translator::new(Fixed(
        r#"{"sql_query":"select region, sum(units) as units from sales group by region order by region","table_name":"units by region"}"#,
    ));
    let mut session = Session::new();
    let result = session.ask(&translator, &store, "units per region").await.unwrap();
    assert_eq!(result.label, "units by region");

    let rows = session.last_results.unwrap();
    assert_eq!(rows.row_count(), 3);
    assert_eq!(rows.rows[0], vec![CellValue::Text("east".to_string()), CellValue::Null]);
    assert_eq!(rows.rows[1], vec![CellValue::Text("north".to_string()), CellValue::Integer(17)]);

    let export = dir.join("out.csv");
    rows.write_csv(&export).unwrap();
    let written = std::fs::read_to_string(&export).unwrap();
    assert_eq!(written, "region,units\neast,\nnorth,17\nsouth,4\n");
}
