//! Message composition for scheduled deliveries.

use postdate_core::DeliveryItem;

use crate::notifier::OutboundEmail;

/// Builds the public download URL for an item's access token.
///
/// The base URL may carry a trailing slash; the result never doubles it.
pub fn access_url(base: &str, token: &str) -> String {
    format!("{}/access/{}", base.trim_end_matches('/'), token)
}

/// Composes the delivery email for an item.
pub fn compose(item: &DeliveryItem, public_base_url: &str) -> OutboundEmail {
    let url = access_url(public_base_url, item.access_token.as_str());
    let subject = format!("A file is ready for you: {}", item.file_name);
    let html_body = format!(
        "<p>A file scheduled for you is now available.</p>\
         <p><a href=\"{url}\">Download {name}</a></p>\
         <p>If the link does not work, copy this address into your browser:<br>{url}</p>",
        url = url,
        name = item.file_name,
    );
    OutboundEmail { to: item.recipient.clone(), subject, html_body }
}
