//! MongoDB-backed [`DocumentStore`]: one Mongo collection per platform
//! collection name, documents keyed by an `_id` string field.

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::{Client, Database};
use ragcore::{DocumentStore, Error, Result};
use serde_json::Value;

pub struct MongoDocumentStore {
    db: Database,
}

impl MongoDocumentStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| Error::Upstream(format!("document store connect failed: {e}")))?;
        Ok(MongoDocumentStore { db: client.database(database) })
    }

    fn collection(&self, name: &str) -> mongodb::Collection<Document> {
        self.db.collection(name)
    }
}

fn json_to_bson_document(id: &str, value: Value) -> Result<Document> {
    let mut bson_value = mongodb::bson::to_bson(&value).map_err(|e| Error::Internal(e.to_string()))?;
    if let Bson::Document(ref mut doc) = bson_value {
        doc.insert("_id", id);
        Ok(doc.clone())
    } else {
        let mut doc = Document::new();
        doc.insert("_id", id);
        doc.insert("value", bson_value);
        Ok(doc)
    }
}

fn bson_document_to_json(mut doc: Document) -> Result<Value> {
    doc.remove("_id");
    mongodb::bson::from_document(doc).map_err(|e| Error::Internal(e.to_string()))
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn upsert(&self, collection: &str, id: &str, document: Value) -> Result<()> {
        let doc = json_to_bson_document(id, document)?;
        self.collection(collection)
            .replace_one(doc! {"_id": id}, doc)
            .upsert(true)
            .await
            .map_err(|e| Error::Upstream(format!("document store upsert failed: {e}")))?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let found = self
            .collection(collection)
            .find_one(doc! {"_id": id})
            .await
            .map_err(|e| Error::Upstream(format!("document store get failed: {e}")))?;
        found.map(bson_document_to_json).transpose()
    }

    async fn find_one_by_field(&self, collection: &str, field: &str, value: &str) -> Result<Option<Value>> {
        let found = self
            .collection(collection)
            .find_one(doc! {field: value})
            .await
            .map_err(|e| Error::Upstream(format!("document store query failed: {e}")))?;
        found.map(bson_document_to_json).transpose()
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>> {
        use futures::stream::TryStreamExt;
        let mut cursor = self
            .collection(collection)
            .find(doc! {})
            .await
            .map_err(|e| Error::Upstream(format!("document store list failed: {e}")))?;
        let mut out = Vec::new();
        while let Some(doc) = cursor
            .try_next()
            .await
            .map_err(|e| Error::Upstream(format!("document store cursor failed: {e}")))?
        {
            out.push(bson_document_to_json(doc)?);
        }
        Ok(out)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.collection(collection)
            .delete_one(doc! {"_id": id})
            .await
            .map_err(|e| Error::Upstream(format!("document store delete failed: {e}")))?;
        Ok(())
    }
}
