use tracing::{debug, warn};

use crate::coordinator::Coordinator;
use crate::error::FaceIdError;
use crate::types::{EnrollHints, MatchPath, Resolution};

impl Coordinator<'_> {
    /// Find the identity of a face, enrolling it when nothing matches.
    ///
    /// The best match wins when its score is strictly above the threshold of
    /// `path`. Runs entirely inside the caller's critical section, so two
    /// concurrent calls with the same unseen face enroll it once.
    pub fn resolve(
        &mut self,
        vector: &[f32],
        hints: EnrollHints,
        path: MatchPath,
    ) -> Result<Resolution, FaceIdError> {
        let threshold = self.config.threshold(path);
        let best = self.state.store.query_top_k(vector, 1)?.into_iter().next();

        if let Some(matched) = best.filter(|m| m.score > threshold) {
            debug!(
                image_id = matched.image_id,
                identity_id = matched.identity_id,
                score = matched.score,
                "faceid: face matched"
            );
            let identity = match self.cx.identities.get(matched.identity_id) {
                Ok(identity) => identity,
                Err(e) => {
                    warn!(identity_id = matched.identity_id, error = %e, "faceid: identity fetch failed");
                    None
                }
            };
            return Ok(Resolution::Matched { matched, identity });
        }

        self.enroll(vector, hints).map(Resolution::Enrolled)
    }
}
