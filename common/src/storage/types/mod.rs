use serde::{Deserialize, Serialize};

pub mod document;
pub mod ingestion_job;
pub mod job_payload;
pub mod serde_helpers;

/// A record persisted in its own SurrealDB table, addressed by a string id.
pub trait StoredObject: Serialize + for<'de> Deserialize<'de> {
    fn table_name() -> &'static str;
    fn get_id(&self) -> &str;
}

/// Declares a stored record type: the given fields plus `id`, `created_at`
/// and `updated_at`, wired up for SurrealDB record ids and datetimes.
///
/// Field attributes that need the SurrealDB serde helpers can reference them
/// by bare name (`serialize_datetime`, `deserialize_option_datetime`, ...);
/// thin shims are emitted into the invoking module. Invoke at most once per
/// module.
#[macro_export]
macro_rules! stored_object {
    ($name:ident, $table:expr, {$($(#[$attr:meta])* $field:ident: $ty:ty),*}) => {
        #[allow(dead_code)]
        fn deserialize_flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
        where
            D: ::serde::Deserializer<'de>,
        {
            $crate::storage::types::serde_helpers::deserialize_flexible_id(deserializer)
        }

        #[allow(dead_code)]
        fn serialize_datetime<S>(
            date: &::chrono::DateTime<::chrono::Utc>,
            serializer: S,
        ) -> Result<S::Ok, S::Error>
        where
            S: ::serde::Serializer,
        {
            $crate::storage::types::serde_helpers::serialize_datetime(date, serializer)
        }

        #[allow(dead_code)]
        fn deserialize_datetime<'de, D>(
            deserializer: D,
        ) -> Result<::chrono::DateTime<::chrono::Utc>, D::Error>
        where
            D: ::serde::Deserializer<'de>,
        {
            $crate::storage::types::serde_helpers::deserialize_datetime(deserializer)
        }

        #[allow(dead_code)]
        fn serialize_option_datetime<S>(
            date: &Option<::chrono::DateTime<::chrono::Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error>
        where
            S: ::serde::Serializer,
        {
            $crate::storage::types::serde_helpers::serialize_option_datetime(date, serializer)
        }

        #[allow(dead_code)]
        fn deserialize_option_datetime<'de, D>(
            deserializer: D,
        ) -> Result<Option<::chrono::DateTime<::chrono::Utc>>, D::Error>
        where
            D: ::serde::Deserializer<'de>,
        {
            $crate::storage::types::serde_helpers::deserialize_option_datetime(deserializer)
        }

        #[derive(Debug, Clone, ::serde::Serialize, ::serde::Deserialize, PartialEq)]
        pub struct $name {
            #[serde(deserialize_with = "deserialize_flexible_id")]
            pub id: String,
            #[serde(
                serialize_with = "serialize_datetime",
                deserialize_with = "deserialize_datetime",
                default
            )]
            pub created_at: ::chrono::DateTime<::chrono::Utc>,
            #[serde(
                serialize_with = "serialize_datetime",
                deserialize_with = "deserialize_datetime",
                default
            )]
            pub updated_at: ::chrono::DateTime<::chrono::Utc>,
            $( $(#[$attr])* pub $field: $ty),*
        }

        impl $crate::storage::types::StoredObject for $name {
            fn table_name() -> &'static str {
                $table
            }

            fn get_id(&self) -> &str {
                &self.id
            }
        }
    };
}
