// web-server/src/api/mod.rs
pub mod auth;
pub mod proofs;
pub mod sessions;

pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(
        actix_web::web::scope("/api")
            .service(auth::api_index)
            .service(auth::issue_nonce)
            .service(auth::credentials_callback)
            .service(auth::get_session)
            .service(auth::sign_out)
            .service(sessions::list_sessions)
            .service(sessions::revoke_session)
            .service(proofs::init_verification)
            .service(proofs::init_verification_ergopay)
            .service(proofs::report_ergopay_address)
            .service(proofs::verify_proof)
            .service(proofs::poll_tx)
            .service(proofs::get_proofs)
            .service(proofs::check_proof_status)
            .service(proofs::delete_proof)
    );
}
