use std::time::Duration;

use storefront_api::{ApiError, Client, Request};

#[tokio::main]
pub async fn main() -> Result<(), ApiError> {
    let client = Client::with_reqwest("http://localhost:3333", Duration::from_secs(10))?;
    client.set_credential(Some("access_token"));

    let profile = client.send(Request::users().me()).await?;
    let listings = client.send(Request::users().products()).await?;
    println!("{} has {} listings", profile.name, listings.len());
    Ok(())
}
