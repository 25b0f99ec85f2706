//! JSON request/response shapes of the backend API.

use forward_types::{ChangeRecord, Mutation, Observation, StreamId};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

pub(crate) const SUBSCRIPTION_DATA_PATH: &str = "/timeseries/subscriptions/data/list";
pub(crate) const BY_IDS_PATH: &str = "/timeseries/byids";
pub(crate) const CREATE_PATH: &str = "/timeseries";
pub(crate) const LATEST_PATH: &str = "/timeseries/data/latest";
pub(crate) const INSERT_PATH: &str = "/timeseries/data";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscriptionDataRequest<'a> {
    pub external_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<&'a str>,
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscriptionDataResponse {
    #[serde(default)]
    pub updates: Vec<WireUpdate>,
    pub cursor: String,
    pub has_next: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireUpdate {
    pub time_series: WireStreamRef,
    #[serde(default)]
    pub upserts: Vec<WireDatapoint>,
    /// Deleted ranges; only their presence matters here.
    #[serde(default)]
    pub deletes: Vec<IgnoredAny>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireStreamRef {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireDatapoint {
    pub timestamp: i64,
    pub value: f64,
}

impl WireUpdate {
    /// Split one update into change records, deletes first.
    pub(crate) fn into_records(self) -> Vec<ChangeRecord> {
        let stream_id = StreamId(self.time_series.id);
        let mut records = Vec::with_capacity(2);

        if !self.deletes.is_empty() {
            records.push(ChangeRecord::delete(stream_id));
        }
        if !self.upserts.is_empty() {
            let observations = self
                .upserts
                .into_iter()
                .map(|dp| Observation::new(dp.timestamp, dp.value))
                .collect();
            records.push(ChangeRecord::upsert(stream_id, observations));
        }
        if records.is_empty() {
            records.push(ChangeRecord {
                stream_id,
                mutation: Mutation::Other,
                observations: Vec::new(),
            });
        }

        records
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ByIdsRequest<T> {
    pub items: Vec<T>,
    pub ignore_unknown_ids: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct InternalId {
    pub id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExternalId<'a> {
    pub external_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct Items<T> {
    pub items: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemsResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateStringStream<'a> {
    pub external_id: &'a str,
    pub name: &'a str,
    pub is_string: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InsertDatapoints<'a> {
    pub external_id: &'a str,
    pub datapoints: Vec<StringDatapoint>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StringDatapoint {
    pub timestamp: i64,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LatestItem {
    #[serde(default)]
    pub datapoints: Vec<StringDatapoint>,
}
