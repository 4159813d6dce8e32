//! Synchronous telephony adapter (request/response model).
//!
//! Inbound calls arrive as one HTTP webhook per call and must be answered
//! within that cycle: the adapter negotiates a session first, then returns a
//! TwiML document pointing the provider's media stream at the join URL. If
//! negotiation fails, the cycle is still answered with an apologetic,
//! non-streaming document, since a dropped webhook would dead-air the
//! caller. Outbound calls are one REST request with the TwiML inlined.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};
use url::Url;

use crate::error::{BridgeError, ProviderApiError};
use crate::negotiator::{NegotiationOptions, SessionNegotiator};
use crate::telephony::{CallDirection, InboundAcceptance, ProviderCallId, TelephonyAdapter};
use crate::ultravox::{SessionHandle, StreamMedium};

/// Spoken when no session could be negotiated for an inbound call.
const APOLOGY_LINE: &str =
    "We're sorry, our voice assistant is unavailable right now. Please try again later.";

#[derive(Clone)]
pub struct TwilioAdapter {
    http: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    negotiator: Arc<SessionNegotiator>,
}

impl std::fmt::Debug for TwilioAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioAdapter")
            .field("account_sid", &self.account_sid)
            .field("from_number", &self.from_number)
            .finish()
    }
}

impl TwilioAdapter {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
        negotiator: Arc<SessionNegotiator>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: "https://api.twilio.com".to_string(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
            negotiator,
        }
    }

    /// Point the adapter at a different API host (tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    async fn create_call(
        &self,
        params: &[(&str, &str)],
    ) -> Result<ProviderCallId, ProviderApiError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.api_base.trim_end_matches('/'),
            self.account_sid
        );

        let response = self
            .http
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ProviderApiError::Rejected {
                status: status.as_u16(),
                detail: body.chars().take(200).collect(),
            });
        }

        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ProviderApiError::Unparsable(e.to_string()))?;
        match parsed.get("sid").and_then(|s| s.as_str()) {
            Some(sid) => Ok(ProviderCallId(sid.to_string())),
            None => Err(ProviderApiError::Unparsable(
                "call response carried no sid".to_string(),
            )),
        }
    }
}

#[async_trait]
impl TelephonyAdapter for TwilioAdapter {
    fn name(&self) -> &'static str {
        "twilio"
    }

    fn stream_medium(&self) -> StreamMedium {
        StreamMedium::Twilio
    }

    async fn originate_outbound(
        &self,
        destination: &str,
        handle: &SessionHandle,
        status_callback: &Url,
    ) -> Result<ProviderCallId, ProviderApiError> {
        let twiml = stream_twiml(&handle.join_url);
        let call_id = self
            .create_call(&[
                ("To", destination),
                ("From", &self.from_number),
                ("Twiml", &twiml),
                ("StatusCallback", status_callback.as_str()),
            ])
            .await?;

        info!(call_sid = %call_id, to = %destination, "outbound call originated");
        Ok(call_id)
    }

    async fn originate_deferred(
        &self,
        destination: &str,
        connect_url: &Url,
        status_callback: &Url,
    ) -> Result<ProviderCallId, ProviderApiError> {
        let call_id = self
            .create_call(&[
                ("To", destination),
                ("From", &self.from_number),
                ("Url", connect_url.as_str()),
                ("Method", "POST"),
                ("StatusCallback", status_callback.as_str()),
            ])
            .await?;

        info!(call_sid = %call_id, to = %destination, "deferred outbound call originated");
        Ok(call_id)
    }

    async fn accept_inbound(&self, payload: &str) -> Result<InboundAcceptance, BridgeError> {
        let fields = parse_form(payload);
        let call_id = fields.get("CallSid").cloned().map(ProviderCallId);

        info!(
            call_sid = ?call_id,
            from = fields.get("From").map(String::as_str).unwrap_or("unknown"),
            "inbound call received"
        );

        let options = NegotiationOptions::new(CallDirection::Inbound, self.stream_medium());
        let body = match self.negotiator.negotiate(options).await {
            Ok(handle) => stream_twiml(&handle.join_url),
            Err(e) => {
                error!(call_sid = ?call_id, error = %e, "inbound negotiation failed");
                apology_twiml()
            }
        };

        Ok(InboundAcceptance::Document { call_id, body })
    }

    fn stream_document(&self, handle: &SessionHandle) -> Option<String> {
        Some(stream_twiml(&handle.join_url))
    }

    fn failure_document(&self) -> Option<String> {
        Some(apology_twiml())
    }
}

/// TwiML instructing the network to stream call media to `join_url`.
pub fn stream_twiml(join_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <Stream url="{}"/>
  </Connect>
</Response>"#,
        escape_xml(join_url)
    )
}

/// Valid, non-streaming TwiML spoken when the session could not be set up.
pub fn apology_twiml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Say>{APOLOGY_LINE}</Say>
  <Hangup/>
</Response>"#
    )
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Parse an `application/x-www-form-urlencoded` webhook body.
fn parse_form(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_twiml_escapes_url() {
        let twiml = stream_twiml("wss://example.com/join?a=1&b=2");
        assert!(twiml.contains("wss://example.com/join?a=1&amp;b=2"));
        assert!(twiml.contains("<Connect>"));
    }

    #[test]
    fn apology_has_no_stream_verb() {
        let twiml = apology_twiml();
        assert!(twiml.contains("<Say>"));
        assert!(!twiml.contains("<Stream"));
    }

    #[test]
    fn form_parsing_decodes_values() {
        let fields = parse_form("CallSid=CA123&From=%2B15551234567");
        assert_eq!(fields["CallSid"], "CA123");
        assert_eq!(fields["From"], "+15551234567");
    }
}
