use serde::{Deserialize, Serialize};

/// One property advertisement extracted from a results page.
///
/// The unit price is never stored; it is derived from `price` and `area_m2`
/// every time it is asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub description: String,
    pub address: Option<String>,
    pub area_m2: Option<f64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub parking: Option<u32>,
    pub price: f64,
    pub condo_fee: Option<f64>,
    pub property_tax: Option<f64>,
}

impl ListingRecord {
    pub fn new(description: impl Into<String>, price: f64) -> Self {
        Self {
            description: description.into(),
            address: None,
            area_m2: None,
            bedrooms: None,
            bathrooms: None,
            parking: None,
            price,
            condo_fee: None,
            property_tax: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_area(mut self, area_m2: f64) -> Self {
        self.area_m2 = Some(area_m2);
        self
    }

    pub fn with_rooms(mut self, bedrooms: u32, bathrooms: u32, parking: u32) -> Self {
        self.bedrooms = Some(bedrooms);
        self.bathrooms = Some(bathrooms);
        self.parking = Some(parking);
        self
    }

    /// Price per square meter, only when the area is known and positive.
    pub fn unit_price(&self) -> Option<f64> {
        match self.area_m2 {
            Some(area) if area > 0.0 => Some(self.price / area),
            _ => None,
        }
    }
}

/// Flat row handed to delimited-file writers and reporting collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct ListingRow<'a> {
    pub description: &'a str,
    pub address: Option<&'a str>,
    pub area_m2: Option<f64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub parking: Option<u32>,
    pub price: f64,
    pub condo_fee: Option<f64>,
    pub property_tax: Option<f64>,
    pub unit_price: Option<f64>,
}

impl<'a> From<&'a ListingRecord> for ListingRow<'a> {
    fn from(record: &'a ListingRecord) -> Self {
        Self {
            description: &record.description,
            address: record.address.as_deref(),
            area_m2: record.area_m2,
            bedrooms: record.bedrooms,
            bathrooms: record.bathrooms,
            parking: record.parking,
            price: record.price,
            condo_fee: record.condo_fee,
            property_tax: record.property_tax,
            unit_price: record.unit_price(),
        }
    }
}
