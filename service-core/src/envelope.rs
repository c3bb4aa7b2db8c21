//! Success envelopes for JSON surfaces.
//!
//! Single resources are wrapped as `{ "data": ... }`; lists additionally
//! carry `{ "paging": { "limit": n, "cursor": "..." } }`.

use serde::Serialize;

/// Single-resource success envelope.
#[derive(Debug, Serialize)]
pub struct Data<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> Data<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Cursor paging block attached to list responses.
#[derive(Debug, Serialize)]
pub struct Paging {
    pub limit: i64,
    /// External id of the last row in the page, null when the page is
    /// short or empty.
    pub cursor: Option<String>,
}

/// List success envelope.
#[derive(Debug, Serialize)]
pub struct ListData<T: Serialize> {
    pub data: Vec<T>,
    pub paging: Paging,
}

impl<T: Serialize> ListData<T> {
    pub fn new(data: Vec<T>, limit: i64, cursor: Option<String>) -> Self {
        Self {
            data,
            paging: Paging { limit, cursor },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_envelope_shape() {
        let v = serde_json::to_value(Data::new(serde_json::json!({"id": "abc"}))).unwrap();
        assert_eq!(v["data"]["id"], "abc");
    }

    #[test]
    fn test_list_envelope_carries_paging() {
        let v = serde_json::to_value(ListData::new(vec![1, 2, 3], 50, Some("ff".into()))).unwrap();
        assert_eq!(v["data"].as_array().unwrap().len(), 3);
        assert_eq!(v["paging"]["limit"], 50);
        assert_eq!(v["paging"]["cursor"], "ff");
    }

    #[test]
    fn test_empty_list_has_null_cursor() {
        let v = serde_json::to_value(ListData::<i32>::new(vec![], 50, None)).unwrap();
        assert!(v["paging"]["cursor"].is_null());
    }
}
