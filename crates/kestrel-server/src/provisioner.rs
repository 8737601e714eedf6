use kestrel_core::{NetworkProvisioner, NetworkSetupRequest, ProvisionError};
use tracing::{debug, warn};

/// Delivers network setup requests to the network subsystem over HTTP.
///
/// Each request is POSTed as JSON from its own thread so the calling pod
/// actor never waits on the network. A failed delivery is only logged: the
/// request stays outstanding and its deadline decides the outcome.
pub struct HttpProvisioner {
    url: String,
    agent: ureq::Agent,
}

impl HttpProvisioner {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_owned(),
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl NetworkProvisioner for HttpProvisioner {
    fn name(&self) -> &'static str {
        "http"
    }

    fn request_setup(&self, request: &NetworkSetupRequest) -> Result<(), ProvisionError> {
        let body = serde_json::to_vec(request).map_err(|e| ProvisionError::Rejected {
            request_id: request.request_id.to_string(),
            reason: e.to_string(),
        })?;
        let agent = self.agent.clone();
        let url = self.url.clone();
        let request_id = request.request_id.clone();

        std::thread::Builder::new()
            .name("kestrel-provision".to_owned())
            .spawn(move || {
                debug!("POST {url} for {request_id} ({} bytes)", body.len());
                let result = agent
                    .post(&url)
                    .header("Content-Type", "application/json")
                    .send(&body[..]);
                match result {
                    Ok(resp) => debug!("network setup {request_id} accepted: {}", resp.status()),
                    Err(e) => warn!("network setup {request_id} not delivered to {url}: {e}"),
                }
            })
            .map_err(|e| ProvisionError::Unreachable(e.to_string()))?;
        Ok(())
    }
}
