use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::entities::{product, protein};
use crate::errors::ServiceError;

/// Priced catalog entry as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub price: i64,
}

/// Read access to the menu catalog. Bulk, set-membership lookups only: one
/// round trip for products and one for proteins, regardless of cart size.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    async fn find_products_by_ids(&self, ids: &[String]) -> Result<Vec<CatalogEntry>, ServiceError>;
    async fn find_proteins_by_ids(&self, ids: &[String]) -> Result<Vec<CatalogEntry>, ServiceError>;
}

pub struct SeaOrmCatalogReader {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmCatalogReader {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogReader for SeaOrmCatalogReader {
    async fn find_products_by_ids(&self, ids: &[String]) -> Result<Vec<CatalogEntry>, ServiceError> {
        let rows = product::Entity::find()
            .filter(product::Column::Id.is_in(ids.to_vec()))
            .all(&*self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|p| CatalogEntry {
                id: p.id,
                name: p.name,
                price: p.price,
            })
            .collect())
    }

    async fn find_proteins_by_ids(&self, ids: &[String]) -> Result<Vec<CatalogEntry>, ServiceError> {
        let rows = protein::Entity::find()
            .filter(protein::Column::Id.is_in(ids.to_vec()))
            .all(&*self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|p| CatalogEntry {
                id: p.id,
                name: p.name,
                price: p.price,
            })
            .collect())
    }
}

/// Cart item as supplied by the client. Ephemeral.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub product: String,
    pub quantity: u32,
    pub proteins: Vec<String>,
}

/// Name/price snapshot of a resolved protein add-on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProteinSnapshot {
    pub reference: String,
    pub name: String,
    pub price: i64,
}

/// Priced line item, frozen at resolution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_reference: String,
    pub name: String,
    pub quantity: u32,
    /// Base product price plus the sum of resolved protein prices.
    pub unit_price: i64,
    pub proteins: Vec<ProteinSnapshot>,
}

impl LineItem {
    pub fn line_total(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

/// Resolves a cart against the catalog: a missing product aborts the whole
/// order with `NotFound`, while a missing protein reference is silently
/// treated as "not applied". That asymmetry is deliberate.
pub struct CatalogResolver {
    reader: Arc<dyn CatalogReader>,
}

impl CatalogResolver {
    pub fn new(reader: Arc<dyn CatalogReader>) -> Self {
        Self { reader }
    }

    pub async fn resolve(&self, items: &[CartItem]) -> Result<Vec<LineItem>, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "cart must contain at least one item".to_string(),
            ));
        }

        let product_ids: Vec<String> = items
            .iter()
            .map(|item| item.product.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let protein_ids: Vec<String> = items
            .iter()
            .flat_map(|item| item.proteins.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let products: HashMap<String, CatalogEntry> = self
            .reader
            .find_products_by_ids(&product_ids)
            .await?
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();

        let proteins: HashMap<String, CatalogEntry> = if protein_ids.is_empty() {
            HashMap::new()
        } else {
            self.reader
                .find_proteins_by_ids(&protein_ids)
                .await?
                .into_iter()
                .map(|entry| (entry.id.clone(), entry))
                .collect()
        };

        let mut line_items = Vec::with_capacity(items.len());
        for item in items {
            let product = products.get(&item.product).ok_or_else(|| {
                ServiceError::NotFound(format!("product '{}' not in catalog", item.product))
            })?;

            let resolved_proteins: Vec<ProteinSnapshot> = item
                .proteins
                .iter()
                .filter_map(|reference| {
                    let entry = proteins.get(reference);
                    if entry.is_none() {
                        debug!(protein = %reference, "unknown protein reference skipped");
                    }
                    entry.map(|p| ProteinSnapshot {
                        reference: p.id.clone(),
                        name: p.name.clone(),
                        price: p.price,
                    })
                })
                .collect();

            let protein_total: i64 = resolved_proteins.iter().map(|p| p.price).sum();

            line_items.push(LineItem {
                product_reference: product.id.clone(),
                name: product.name.clone(),
                quantity: item.quantity,
                unit_price: product.price + protein_total,
                proteins: resolved_proteins,
            });
        }

        Ok(line_items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub struct StaticCatalog {
        products: Vec<CatalogEntry>,
        proteins: Vec<CatalogEntry>,
    }

    impl StaticCatalog {
        fn sample() -> Arc<Self> {
            Arc::new(Self {
                products: vec![
                    CatalogEntry {
                        id: "rice".into(),
                        name: "Jollof Rice".into(),
                        price: 4500,
                    },
                    CatalogEntry {
                        id: "beans".into(),
                        name: "Ewa Agoyin".into(),
                        price: 3000,
                    },
                ],
                proteins: vec![CatalogEntry {
                    id: "chicken".into(),
                    name: "Grilled Chicken".into(),
                    price: 3500,
                }],
            })
        }
    }

    #[async_trait]
    impl CatalogReader for StaticCatalog {
        async fn find_products_by_ids(
            &self,
            ids: &[String],
        ) -> Result<Vec<CatalogEntry>, ServiceError> {
            Ok(self
                .products
                .iter()
                .filter(|p| ids.contains(&p.id))
                .cloned()
                .collect())
        }

        async fn find_proteins_by_ids(
            &self,
            ids: &[String],
        ) -> Result<Vec<CatalogEntry>, ServiceError> {
            Ok(self
                .proteins
                .iter()
                .filter(|p| ids.contains(&p.id))
                .cloned()
                .collect())
        }
    }

    fn cart(product: &str, quantity: u32, proteins: &[&str]) -> CartItem {
        CartItem {
            product: product.to_string(),
            quantity,
            proteins: proteins.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn resolves_product_with_protein_snapshot() {
        let resolver = CatalogResolver::new(StaticCatalog::sample());
        let lines = resolver
            .resolve(&[cart("rice", 2, &["chicken"])])
            .await
            .unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].unit_price, 8000);
        assert_eq!(lines[0].line_total(), 16000);
        assert_eq!(lines[0].proteins[0].name, "Grilled Chicken");
    }

    #[tokio::test]
    async fn missing_product_aborts_the_whole_cart() {
        let resolver = CatalogResolver::new(StaticCatalog::sample());
        let err = resolver
            .resolve(&[cart("rice", 1, &[]), cart("suya", 1, &[])])
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_protein_is_silently_skipped() {
        let resolver = CatalogResolver::new(StaticCatalog::sample());
        let lines = resolver
            .resolve(&[cart("rice", 1, &["goat"])])
            .await
            .unwrap();

        assert_eq!(lines[0].unit_price, 4500);
        assert!(lines[0].proteins.is_empty());
    }

    #[tokio::test]
    async fn empty_cart_is_rejected() {
        let resolver = CatalogResolver::new(StaticCatalog::sample());
        let err = resolver.resolve(&[]).await.unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }
}
