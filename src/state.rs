use crate::alert::AlertSink;
use crate::rate_limit::AdmissionPolicy;

// app's shared state

pub struct AppState {
    pub client: reqwest::Client,      // forwards admitted requests
    pub policy: AdmissionPolicy,      // single instance for the process
    pub alerts: AlertSink,
}
