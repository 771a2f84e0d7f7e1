//! Oracle-assisted field mapping suggestions.

use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use bmecat_shared::{FeatureMapping, FieldMapping, Result, TemplateContractError};

use crate::oracle::{SpecSources, TemplatingOracle, classify_oracle_error, strip_code_fence};
use crate::prompts;

/// One BMEcat field the oracle discovered, with its CSV column if matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestedField {
    pub key: String,
    pub label: String,
    pub description: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapped_csv_header: Option<String>,
}

/// Cleaned oracle mapping suggestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuggestedMapping {
    pub identified_fields: Vec<SuggestedField>,
    pub feature_mappings: Vec<FeatureMapping>,
}

impl SuggestedMapping {
    /// Fields with a CSV column, as a mapping ready for the row mapper.
    pub fn to_field_mapping(&self) -> FieldMapping {
        FieldMapping {
            fields: self
                .identified_fields
                .iter()
                .filter_map(|f| {
                    f.mapped_csv_header
                        .as_ref()
                        .map(|header| (f.key.clone(), header.clone()))
                })
                .collect(),
            features: self.feature_mappings.clone(),
        }
    }
}

/// Ask the oracle which CSV columns map to which BMEcat fields.
#[instrument(skip_all, fields(headers = headers.len()))]
pub async fn suggest_mapping<O: TemplatingOracle>(
    oracle: &O,
    headers: &[String],
    sources: &SpecSources,
) -> Result<SuggestedMapping> {
    let request = prompts::field_mapping_request(headers, &sources.prompt_sources(sources.xml_sample.as_deref()));
    let reply = oracle.complete(&request).await.map_err(classify_oracle_error)?;

    let json_text = strip_code_fence(reply.trim());
    if json_text.is_empty() {
        warn!("oracle returned an empty mapping suggestion");
        return Ok(SuggestedMapping::default());
    }

    let value: Value =
        serde_json::from_str(json_text).map_err(|e| TemplateContractError::MalformedReply {
            detail: format!("invalid JSON: {e}"),
        })?;

    let suggestion = clean_suggestion(&value, headers);
    info!(
        fields = suggestion.identified_fields.len(),
        mapped = suggestion
            .identified_fields
            .iter()
            .filter(|f| f.mapped_csv_header.is_some())
            .count(),
        features = suggestion.feature_mappings.len(),
        "mapping suggestion cleaned"
    );
    Ok(suggestion)
}

/// Keep only well-formed entries that point at real CSV headers.
pub fn clean_suggestion(value: &Value, headers: &[String]) -> SuggestedMapping {
    let is_header = |name: &str| headers.iter().any(|h| h == name);
    let text = |obj: &Value, key: &str| -> Option<String> {
        obj.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let identified_fields = value
        .get("identifiedFields")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter(|f| f.is_object())
        .filter_map(|f| {
            let key = text(f, "key")?;
            let label = text(f, "label")?;
            Some(SuggestedField {
                key,
                label,
                description: text(f, "description").unwrap_or_default(),
                required: f.get("required").and_then(Value::as_bool).unwrap_or(false),
                mapped_csv_header: text(f, "mappedCsvHeader").filter(|h| is_header(h)),
            })
        })
        .collect();

    let feature_mappings = value
        .get("featureMappings")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(|fm| {
            let fname = text(fm, "fname").filter(|h| is_header(h))?;
            let fvalue = text(fm, "fvalue").filter(|h| is_header(h))?;
            Some(FeatureMapping {
                fname,
                fvalue,
                funit: text(fm, "funit").filter(|h| is_header(h)),
            })
        })
        .collect();

    SuggestedMapping {
        identified_fields,
        feature_mappings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleTask;
    use crate::oracle::testing::ScriptedOracle;
    use serde_json::json;

    fn headers() -> Vec<String> {
        ["Artikelnummer", "Preis", "Merkmal1", "Wert1", "Einheit1"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn cleaning_drops_unknown_headers() {
        let value = json!({
            "identifiedFields": [
                { "key": "SUPPLIER_AID", "label": "Artikelnummer", "description": "id", "required": true, "mappedCsvHeader": "Artikelnummer" },
                { "key": "EAN", "label": "EAN", "required": false, "mappedCsvHeader": "GTIN" },
                { "key": "", "label": "no key" },
                { "label": "missing key" },
                "not an object"
            ],
            "featureMappings": [
                { "fname": "Merkmal1", "fvalue": "Wert1", "funit": "Einheit1" },
                { "fname": "Merkmal1", "fvalue": "Wert1", "funit": "Einheit9" },
                { "fname": "Merkmal2", "fvalue": "Wert1" }
            ]
        });
        let cleaned = clean_suggestion(&value, &headers());

        assert_eq!(cleaned.identified_fields.len(), 2);
        assert_eq!(cleaned.identified_fields[0].mapped_csv_header.as_deref(), Some("Artikelnummer"));
        assert!(cleaned.identified_fields[0].required);
        assert_eq!(cleaned.identified_fields[1].mapped_csv_header, None);
        assert_eq!(cleaned.identified_fields[1].description, "");

        assert_eq!(cleaned.feature_mappings.len(), 2);
        assert_eq!(cleaned.feature_mappings[0].funit.as_deref(), Some("Einheit1"));
        assert_eq!(cleaned.feature_mappings[1].funit, None);
    }

    #[test]
    fn null_headers_from_strict_replies_mean_unmapped() {
        let value = json!({
            "identifiedFields": [
                { "key": "EAN", "label": "EAN", "description": "", "required": false, "mappedCsvHeader": null }
            ],
            "featureMappings": [
                { "fname": "Merkmal1", "fvalue": "Wert1", "funit": null }
            ]
        });
        let cleaned = clean_suggestion(&value, &headers());
        assert_eq!(cleaned.identified_fields[0].mapped_csv_header, None);
        assert_eq!(cleaned.feature_mappings.len(), 1);
        assert_eq!(cleaned.feature_mappings[0].funit, None);
    }

    #[test]
    fn converts_into_field_mapping() {
        let suggestion = SuggestedMapping {
            identified_fields: vec![
                SuggestedField {
                    key: "SUPPLIER_AID".into(),
                    label: "Artikelnummer".into(),
                    description: String::new(),
                    required: true,
                    mapped_csv_header: Some("Artikelnummer".into()),
                },
                SuggestedField {
                    key: "EAN".into(),
                    label: "EAN".into(),
                    description: String::new(),
                    required: false,
                    mapped_csv_header: None,
                },
            ],
            feature_mappings: vec![],
        };
        let mapping = suggestion.to_field_mapping();
        assert_eq!(mapping.fields.len(), 1);
        assert_eq!(mapping.fields["SUPPLIER_AID"], "Artikelnummer");
    }

    #[tokio::test]
    async fn empty_reply_is_empty_suggestion() {
        let oracle = ScriptedOracle::default().reply(OracleTask::FieldMapping, "   ");
        let suggestion = suggest_mapping(&oracle, &headers(), &SpecSources::default())
            .await
            .expect("suggestion");
        assert_eq!(suggestion, SuggestedMapping::default());
    }

    #[tokio::test]
    async fn suggestion_round_trip_through_oracle() {
        let reply = json!({
            "identifiedFields": [{ "key": "PRICE_AMOUNT", "label": "Preis", "description": "", "required": true, "mappedCsvHeader": "Preis" }],
            "featureMappings": []
        })
        .to_string();
        let oracle = ScriptedOracle::default().reply(OracleTask::FieldMapping, reply);
        let suggestion = suggest_mapping(&oracle, &headers(), &SpecSources::default())
            .await
            .expect("suggestion");
        assert_eq!(suggestion.to_field_mapping().fields["PRICE_AMOUNT"], "Preis");
    }

    #[tokio::test]
    async fn garbage_reply_is_malformed() {
        let oracle = ScriptedOracle::default().reply(OracleTask::FieldMapping, "Sure! Here is your mapping");
        let err = suggest_mapping(&oracle, &headers(), &SpecSources::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            bmecat_shared::BmecatError::TemplateContract(TemplateContractError::MalformedReply { .. })
        ));
    }
}
