use anyhow::Result;
use pixelbeam::encode::{CategoricalEncoder, UnseenPolicy, Vocabulary};
use pixelbeam::error::EncodingError;
use pixelbeam::table::Table;
use pixelbeam::testing::*;
use pixelbeam::value::Value;

fn servers(values: &[Option<&str>]) -> Table {
    let mut t = Table::new(["player", "server_id", "level"]);
    for (i, v) in values.iter().enumerate() {
        t.push_row(vec![
            Value::from(format!("p{i}")),
            v.map_or(Value::Null, Value::from),
            Value::from(i),
        ]);
    }
    t
}

fn cols() -> Vec<String> {
    vec!["server_id".to_string()]
}

#[test]
fn two_servers_two_indicators() -> Result<()> {
    let enc = CategoricalEncoder::default();
    let (out, encoded) = enc.encode(servers(&[Some("us1"), Some("eu1")]), &cols())?;

    assert_columns(&out, &["player", "server_id_eu1", "server_id_us1", "level"]);
    assert_column_values(&out, "server_id_eu1", &[Value::Int(0), Value::Int(1)]);
    assert_column_values(&out, "server_id_us1", &[Value::Int(1), Value::Int(0)]);
    assert_one_hot(&out, "server_id");
    assert_eq!(encoded[0].indicators, ["server_id_eu1", "server_id_us1"]);
    Ok(())
}

#[test]
fn layout_ignores_row_order() -> Result<()> {
    let enc = CategoricalEncoder::default();
    let a = [Some("us1"), Some("eu1"), Some("asia2"), Some("eu1")];
    let mut b = a;
    b.reverse();
    let (ta, _) = enc.encode(servers(&a), &cols())?;
    let (tb, _) = enc.encode(servers(&b), &cols())?;
    assert_eq!(ta.columns(), tb.columns());

    // identical input, identical bytes
    let (tc, _) = enc.encode(servers(&a), &cols())?;
    assert_eq!(ta, tc);
    Ok(())
}

#[test]
fn null_is_an_all_zero_row() -> Result<()> {
    let (out, _) = CategoricalEncoder::default().encode(servers(&[Some("eu1"), None]), &cols())?;
    assert_columns(&out, &["player", "server_id_eu1", "level"]);
    assert_column_values(&out, "server_id_eu1", &[Value::Int(1), Value::Int(0)]);
    Ok(())
}

#[test]
fn fixed_vocabulary_policies() -> Result<()> {
    let input = || servers(&[Some("eu1"), Some("sa3")]);
    let vocab = Vocabulary::new(["us1", "eu1"]);

    let other = CategoricalEncoder::new(UnseenPolicy::Other).with_vocabulary("server_id", vocab.clone());
    let (out, encoded) = other.encode(input(), &cols())?;
    assert_columns(&out, &["player", "server_id_eu1", "server_id_us1", "server_id__other", "level"]);
    assert_column_values(&out, "server_id__other", &[Value::Int(0), Value::Int(1)]);
    assert_eq!(encoded[0].unseen_rows, 1);

    let zero = CategoricalEncoder::new(UnseenPolicy::Zero).with_vocabulary("server_id", vocab.clone());
    let (out, _) = zero.encode(input(), &cols())?;
    assert_columns(&out, &["player", "server_id_eu1", "server_id_us1", "level"]);
    assert_column_values(&out, "server_id_eu1", &[Value::Int(1), Value::Int(0)]);
    assert_column_values(&out, "server_id_us1", &[Value::Int(0), Value::Int(0)]);

    let strict = CategoricalEncoder::new(UnseenPolicy::Error).with_vocabulary("server_id", vocab);
    let err = strict.encode(input(), &cols()).unwrap_err();
    assert_eq!(
        err,
        EncodingError::UnseenCategory {
            column: "server_id".to_string(),
            value: "sa3".to_string(),
        }
    );
    Ok(())
}

#[test]
fn unconfigured_and_missing_columns_untouched() -> Result<()> {
    let input = servers(&[Some("eu1")]);
    let (out, encoded) = CategoricalEncoder::default().encode(input.clone(), &["biome".to_string()])?;
    assert_eq!(out, input);
    assert!(encoded.is_empty());
    Ok(())
}
