//! Reference data the ledger points at: products, warehouses, shelf locations,
//! departments.
//!
//! These records are maintained outside the core; the catalog only answers
//! "does this id exist" and "what does it look like" for referential checks.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use stockroute_core::{
    DepartmentId, DomainError, DomainResult, Entity, LocationId, ProductId, UserId, WarehouseId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Unit of measure, e.g. "pcs" or "kg".
    pub unit: String,
    pub category: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub address: String,
    pub manager: Option<UserId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Zone,
    Rack,
    Shelf,
    Bin,
    Other,
}

/// A storage location inside a warehouse. Locations nest (zone > rack > shelf > bin)
/// through `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub warehouse_id: WarehouseId,
    pub code: String,
    pub name: String,
    pub kind: LocationKind,
    pub parent: Option<LocationId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub contact_person: String,
    pub contact_phone: String,
}

macro_rules! impl_entity {
    ($t:ty, $id:ty) => {
        impl Entity for $t {
            type Id = $id;

            fn id(&self) -> &Self::Id {
                &self.id
            }
        }
    };
}

impl_entity!(Product, ProductId);
impl_entity!(Warehouse, WarehouseId);
impl_entity!(Location, LocationId);
impl_entity!(Department, DepartmentId);

#[derive(Debug, Default)]
struct CatalogInner {
    products: HashMap<ProductId, Product>,
    warehouses: HashMap<WarehouseId, Warehouse>,
    locations: HashMap<LocationId, Location>,
    departments: HashMap<DepartmentId, Department>,
}

/// In-memory reference catalog.
#[derive(Debug, Default)]
pub struct Catalog {
    inner: RwLock<CatalogInner>,
}

fn poisoned() -> DomainError {
    DomainError::conflict("catalog lock poisoned")
}

fn require_name(what: &str, name: &str) -> DomainResult<()> {
    if name.trim().is_empty() {
        return Err(DomainError::validation(format!("{what} name cannot be empty")));
    }
    Ok(())
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_product(&self, product: Product) -> DomainResult<ProductId> {
        require_name("product", &product.name)?;
        if product.unit.trim().is_empty() {
            return Err(DomainError::validation("product unit cannot be empty"));
        }
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let id = product.id;
        inner.products.insert(id, product);
        Ok(id)
    }

    pub fn add_warehouse(&self, warehouse: Warehouse) -> DomainResult<WarehouseId> {
        require_name("warehouse", &warehouse.name)?;
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let id = warehouse.id;
        inner.warehouses.insert(id, warehouse);
        Ok(id)
    }

    pub fn add_department(&self, department: Department) -> DomainResult<DepartmentId> {
        require_name("department", &department.name)?;
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let id = department.id;
        inner.departments.insert(id, department);
        Ok(id)
    }

    /// Register a location. The parent (if any) must already exist in the same
    /// warehouse, which also rules out cycles. Codes are unique per warehouse.
    pub fn add_location(&self, location: Location) -> DomainResult<LocationId> {
        require_name("location", &location.name)?;
        if location.code.trim().is_empty() {
            return Err(DomainError::validation("location code cannot be empty"));
        }

        let mut inner = self.inner.write().map_err(|_| poisoned())?;

        if !inner.warehouses.contains_key(&location.warehouse_id) {
            return Err(DomainError::not_found(format!(
                "warehouse {}",
                location.warehouse_id
            )));
        }

        if let Some(parent_id) = location.parent {
            let parent = inner
                .locations
                .get(&parent_id)
                .ok_or_else(|| DomainError::not_found(format!("location {parent_id}")))?;
            if parent.warehouse_id != location.warehouse_id {
                return Err(DomainError::validation(
                    "parent location belongs to a different warehouse",
                ));
            }
        }

        let duplicate = inner.locations.values().any(|l| {
            l.id != location.id && l.warehouse_id == location.warehouse_id && l.code == location.code
        });
        if duplicate {
            return Err(DomainError::conflict(format!(
                "location code '{}' already used in this warehouse",
                location.code
            )));
        }

        let id = location.id;
        inner.locations.insert(id, location);
        Ok(id)
    }

    pub fn product(&self, id: ProductId) -> DomainResult<Product> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        inner
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("product {id}")))
    }

    pub fn warehouse(&self, id: WarehouseId) -> DomainResult<Warehouse> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        inner
            .warehouses
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("warehouse {id}")))
    }

    pub fn location(&self, id: LocationId) -> DomainResult<Location> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        inner
            .locations
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("location {id}")))
    }

    pub fn department(&self, id: DepartmentId) -> DomainResult<Department> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        inner
            .departments
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("department {id}")))
    }

    /// Codes from the outermost location down to `id`, joined with `" > "`.
    pub fn location_path(&self, id: LocationId) -> DomainResult<String> {
        let inner = self.inner.read().map_err(|_| poisoned())?;

        let mut codes: Vec<&str> = Vec::new();
        let mut current = Some(id);
        while let Some(loc_id) = current {
            let loc = inner
                .locations
                .get(&loc_id)
                .ok_or_else(|| DomainError::not_found(format!("location {loc_id}")))?;
            codes.push(&loc.code);
            // Parents are registered before children, so this walk terminates;
            // the length guard protects against hand-edited data.
            if codes.len() > inner.locations.len() {
                return Err(DomainError::validation("location hierarchy contains a cycle"));
            }
            current = loc.parent;
        }

        codes.reverse();
        Ok(codes.join(" > "))
    }

    /// Direct children of a location.
    pub fn child_locations(&self, id: LocationId) -> DomainResult<Vec<Location>> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        let mut children: Vec<Location> = inner
            .locations
            .values()
            .filter(|l| l.parent == Some(id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warehouse(catalog: &Catalog) -> WarehouseId {
        catalog
            .add_warehouse(Warehouse {
                id: WarehouseId::new(),
                name: "Central".into(),
                address: "1 Depot Rd".into(),
                manager: None,
            })
            .unwrap()
    }

    fn location(
        warehouse_id: WarehouseId,
        code: &str,
        kind: LocationKind,
        parent: Option<LocationId>,
    ) -> Location {
        Location {
            id: LocationId::new(),
            warehouse_id,
            code: code.into(),
            name: code.into(),
            kind,
            parent,
        }
    }

    #[test]
    fn full_path_walks_parents() {
        let catalog = Catalog::new();
        let wh = warehouse(&catalog);
        let zone = catalog
            .add_location(location(wh, "A", LocationKind::Zone, None))
            .unwrap();
        let rack = catalog
            .add_location(location(wh, "A-01", LocationKind::Rack, Some(zone)))
            .unwrap();
        let bin = catalog
            .add_location(location(wh, "A-01-3", LocationKind::Bin, Some(rack)))
            .unwrap();

        assert_eq!(catalog.location_path(bin).unwrap(), "A > A-01 > A-01-3");
        assert_eq!(catalog.location_path(zone).unwrap(), "A");
        assert_eq!(catalog.child_locations(zone).unwrap().len(), 1);
    }

    #[test]
    fn location_code_is_unique_per_warehouse() {
        let catalog = Catalog::new();
        let wh = warehouse(&catalog);
        catalog
            .add_location(location(wh, "B", LocationKind::Zone, None))
            .unwrap();
        let err = catalog
            .add_location(location(wh, "B", LocationKind::Zone, None))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        let other = warehouse(&catalog);
        assert!(
            catalog
                .add_location(location(other, "B", LocationKind::Zone, None))
                .is_ok()
        );
    }

    #[test]
    fn parent_must_live_in_same_warehouse() {
        let catalog = Catalog::new();
        let a = warehouse(&catalog);
        let b = warehouse(&catalog);
        let zone = catalog
            .add_location(location(a, "Z", LocationKind::Zone, None))
            .unwrap();
        let err = catalog
            .add_location(location(b, "Z-1", LocationKind::Rack, Some(zone)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn unknown_references_are_not_found() {
        let catalog = Catalog::new();
        assert!(matches!(
            catalog.product(ProductId::new()),
            Err(DomainError::NotFound(_))
        ));
        assert!(matches!(
            catalog.add_location(location(WarehouseId::new(), "X", LocationKind::Bin, None)),
            Err(DomainError::NotFound(_))
        ));
    }
}
