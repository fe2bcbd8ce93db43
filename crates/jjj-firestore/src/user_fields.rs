//! Mapping between [`UserRecord`] and Firestore document fields.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use jjj_models::{
    ChatCounters, ImageCounters, PlanTier, TtsCounters, UserPatch, UserRecord,
};

use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{Document, FromFirestoreValue, ToFirestoreValue, Value};

/// Collection holding one document per user.
pub const USERS_COLLECTION: &str = "users";

impl ToFirestoreValue for ChatCounters {
    fn to_firestore_value(&self) -> Value {
        Value::map(HashMap::from([(
            "messages".to_string(),
            self.messages.to_firestore_value(),
        )]))
    }
}

impl ToFirestoreValue for TtsCounters {
    fn to_firestore_value(&self) -> Value {
        Value::map(HashMap::from([
            ("clips".to_string(), self.clips.to_firestore_value()),
            ("seconds".to_string(), self.seconds.to_firestore_value()),
        ]))
    }
}

impl ToFirestoreValue for ImageCounters {
    fn to_firestore_value(&self) -> Value {
        Value::map(HashMap::from([(
            "images".to_string(),
            self.images.to_firestore_value(),
        )]))
    }
}

fn counter(fields: &HashMap<String, Value>, name: &str) -> u64 {
    fields
        .get(name)
        .and_then(u64::from_firestore_value)
        .unwrap_or(0)
}

fn buckets<T>(
    fields: &HashMap<String, Value>,
    name: &str,
    parse: impl Fn(&HashMap<String, Value>) -> T,
) -> BTreeMap<String, T> {
    fields
        .get(name)
        .and_then(Value::as_map)
        .map(|keys| {
            keys.iter()
                .filter_map(|(key, v)| v.as_map().map(|c| (key.clone(), parse(c))))
                .collect()
        })
        .unwrap_or_default()
}

/// Full field set for a new user document.
pub fn user_to_fields(user: &UserRecord) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("userId".to_string(), user.user_id.to_firestore_value());
    fields.insert("email".to_string(), user.email.to_firestore_value());
    if let Some(hash) = &user.password_hash {
        fields.insert("passwordHash".to_string(), hash.to_firestore_value());
    }
    fields.insert("isGuest".to_string(), user.is_guest.to_firestore_value());
    fields.insert("plan".to_string(), user.plan.as_str().to_firestore_value());
    fields.insert("coins".to_string(), user.coins.to_firestore_value());
    fields.insert("chatDaily".to_string(), user.chat_daily.to_firestore_value());
    fields.insert("chatMonthly".to_string(), user.chat_monthly.to_firestore_value());
    fields.insert("ttsDaily".to_string(), user.tts_daily.to_firestore_value());
    fields.insert("ttsMonthly".to_string(), user.tts_monthly.to_firestore_value());
    fields.insert("imageDaily".to_string(), user.image_daily.to_firestore_value());
    fields.insert("imageMonthly".to_string(), user.image_monthly.to_firestore_value());
    fields.insert(
        "planExpiresAt".to_string(),
        user.plan_expires_at.to_firestore_value(),
    );
    fields.insert("proSince".to_string(), user.pro_since.to_firestore_value());
    fields.insert("proSource".to_string(), user.pro_source.to_firestore_value());
    fields.insert(
        "appliedPayments".to_string(),
        user.applied_payments.to_firestore_value(),
    );
    fields.insert("createdAt".to_string(), user.created_at.to_firestore_value());
    fields.insert("updatedAt".to_string(), user.updated_at.to_firestore_value());
    fields
}

/// Parse a user document. Missing fields take their guest defaults.
pub fn parse_user_document(doc: &Document) -> FirestoreResult<UserRecord> {
    let empty = HashMap::new();
    let fields = doc.fields.as_ref().unwrap_or(&empty);

    let get_string = |key: &str| fields.get(key).and_then(String::from_firestore_value);
    let get_time =
        |key: &str| fields.get(key).and_then(<DateTime<Utc>>::from_firestore_value);

    let user_id = get_string("userId")
        .or_else(|| doc.id().map(str::to_string))
        .ok_or_else(|| {
            FirestoreError::SerializationError("user document has neither userId nor name".into())
        })?;

    let created_at = get_time("createdAt")
        .or_else(|| {
            doc.create_time
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(Into::into)
        })
        .unwrap_or_else(Utc::now);

    Ok(UserRecord {
        user_id,
        email: get_string("email"),
        password_hash: get_string("passwordHash"),
        is_guest: fields
            .get("isGuest")
            .and_then(bool::from_firestore_value)
            .unwrap_or(true),
        plan: get_string("plan")
            .map(|p| PlanTier::from_str_lossy(&p))
            .unwrap_or_default(),
        coins: counter(fields, "coins"),
        chat_daily: buckets(fields, "chatDaily", |c| ChatCounters {
            messages: counter(c, "messages"),
        }),
        chat_monthly: buckets(fields, "chatMonthly", |c| ChatCounters {
            messages: counter(c, "messages"),
        }),
        tts_daily: buckets(fields, "ttsDaily", |c| TtsCounters {
            clips: counter(c, "clips"),
            seconds: counter(c, "seconds"),
        }),
        tts_monthly: buckets(fields, "ttsMonthly", |c| TtsCounters {
            clips: counter(c, "clips"),
            seconds: counter(c, "seconds"),
        }),
        image_daily: buckets(fields, "imageDaily", |c| ImageCounters {
            images: counter(c, "images"),
        }),
        image_monthly: buckets(fields, "imageMonthly", |c| ImageCounters {
            images: counter(c, "images"),
        }),
        plan_expires_at: get_time("planExpiresAt"),
        pro_since: get_time("proSince"),
        pro_source: get_string("proSource"),
        applied_payments: fields
            .get("appliedPayments")
            .and_then(<Vec<String>>::from_firestore_value)
            .unwrap_or_default(),
        created_at,
        updated_at: get_time("updatedAt").unwrap_or(created_at),
    })
}

/// Fields and update mask for a partial update. `updatedAt` is always written.
pub fn patch_to_fields(
    patch: &UserPatch,
    now: DateTime<Utc>,
) -> (HashMap<String, Value>, Vec<String>) {
    let mut fields = HashMap::new();

    if let Some(email) = &patch.email {
        fields.insert("email".to_string(), email.to_firestore_value());
    }
    if let Some(hash) = &patch.password_hash {
        fields.insert("passwordHash".to_string(), hash.to_firestore_value());
    }
    if let Some(is_guest) = patch.is_guest {
        fields.insert("isGuest".to_string(), is_guest.to_firestore_value());
    }
    if let Some(plan) = patch.plan {
        fields.insert("plan".to_string(), plan.as_str().to_firestore_value());
    }
    if let Some(coins) = patch.coins {
        fields.insert("coins".to_string(), coins.to_firestore_value());
    }
    if let Some(expires) = patch.plan_expires_at {
        fields.insert("planExpiresAt".to_string(), expires.to_firestore_value());
    }
    if let Some(since) = patch.pro_since {
        fields.insert("proSince".to_string(), since.to_firestore_value());
    }
    if let Some(source) = &patch.pro_source {
        fields.insert("proSource".to_string(), source.to_firestore_value());
    }
    if let Some(payments) = &patch.applied_payments {
        fields.insert("appliedPayments".to_string(), payments.to_firestore_value());
    }
    fields.insert("updatedAt".to_string(), now.to_firestore_value());

    let mut mask: Vec<String> = fields.keys().cloned().collect();
    mask.sort();
    (fields, mask)
}
