//! Delivery location lookup: postal-code directory and coordinate reverse lookup.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;
use crate::domain::value_objects::{Pincode, PincodeError};
use crate::local::DeliveryLocation;

#[derive(Debug, Error)]
pub enum LocationError {
    #[error(transparent)]
    Pincode(#[from] PincodeError),
    #[error("Location not found")]
    NotFound,
    #[error("location lookup by coordinates is not configured")]
    Disabled,
    #[error("location request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("location service returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Deserialize)]
struct PincodeResponse {
    #[serde(rename = "PostOffice", default)]
    post_office: Option<Vec<PostOffice>>,
}

#[derive(Debug, Deserialize)]
struct PostOffice {
    #[serde(rename = "District")]
    district: String,
    #[serde(rename = "Pincode")]
    pincode: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NearbyResponse {
    #[serde(default)]
    postal_codes: Vec<NearbyCode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NearbyCode {
    postal_code: String,
    place_name: String,
}

#[derive(Clone)]
pub struct LocationClient {
    client: reqwest::Client,
    pincode_url: String,
    geonames_url: String,
    geonames_username: Option<String>,
}

impl LocationClient {
    pub fn new(pincode_url: &str, geonames_url: &str, geonames_username: Option<String>, timeout: Duration) -> Result<Self, LocationError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            pincode_url: pincode_url.trim_end_matches('/').to_string(),
            geonames_url: geonames_url.trim_end_matches('/').to_string(),
            geonames_username,
        })
    }

    /// Resolves a six-digit code to the district it belongs to.
    #[instrument(skip(self))]
    pub async fn lookup_pincode(&self, input: &str) -> Result<DeliveryLocation, LocationError> {
        let pincode = Pincode::parse(input)?;
        let url = format!("{}/pincode/{}", self.pincode_url, pincode.as_str());
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() { return Err(LocationError::Status(response.status())); }
        let body: Vec<PincodeResponse> = response.json().await?;
        first_post_office(body)
    }

    /// Nearest postal code to a coordinate pair.
    #[instrument(skip(self))]
    pub async fn nearby(&self, lat: f64, lng: f64) -> Result<DeliveryLocation, LocationError> {
        let response = self.nearby_request(lat, lng)?.send().await?;
        if !response.status().is_success() { return Err(LocationError::Status(response.status())); }
        first_nearby(response.json().await?)
    }

    fn nearby_request(&self, lat: f64, lng: f64) -> Result<reqwest::RequestBuilder, LocationError> {
        let username = self.geonames_username.as_deref().ok_or(LocationError::Disabled)?;
        Ok(self
            .client
            .get(format!("{}/findNearbyPostalCodesJSON", self.geonames_url))
            .query(&[("lat", lat), ("lng", lng)])
            .query(&[("username", username)]))
    }
}

fn first_post_office(body: Vec<PincodeResponse>) -> Result<DeliveryLocation, LocationError> {
    body.into_iter()
        .next()
        .and_then(|r| r.post_office)
        .and_then(|offices| offices.into_iter().next())
        .map(|office| DeliveryLocation { location_name: office.district, user_zip_code: office.pincode })
        .ok_or(LocationError::NotFound)
}

fn first_nearby(body: NearbyResponse) -> Result<DeliveryLocation, LocationError> {
    body.postal_codes
        .into_iter()
        .next()
        .map(|code| DeliveryLocation { location_name: code.place_name, user_zip_code: code.postal_code })
        .ok_or(LocationError::NotFound)
}
