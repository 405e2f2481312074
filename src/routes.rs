use crate::{
    api::{attendance, live, permission, presence, report, zone},
    auth::middleware::identity_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};

/// Per-IP limiter allowing `requests_per_min` with an equal burst.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        // period and burst are both non-zero here
        .unwrap_or_default();
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(identity_middleware))
            .wrap(build_limiter(config.rate_protected_per_min))
            .configure(api_routes),
    );
}

/// Every endpoint, relative to the API prefix. Identity is required on all.
pub fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/zones")
            // /zones
            .service(
                web::resource("")
                    .route(web::post().to(zone::create_zone))
                    .route(web::get().to(zone::list_zones)),
            )
            // /zones/mine
            .service(web::resource("/mine").route(web::get().to(zone::my_zone)))
            // /zones/{id}
            .service(
                web::resource("/{zone_id}")
                    .route(web::get().to(zone::get_zone))
                    .route(web::delete().to(zone::remove_zone)),
            )
            .service(
                web::resource("/{zone_id}/geometry").route(web::put().to(zone::update_geometry)),
            )
            .service(
                web::resource("/{zone_id}/schedule").route(web::put().to(zone::update_schedule)),
            )
            .service(
                web::resource("/{zone_id}/members").route(web::post().to(zone::assign_member)),
            )
            .service(
                web::resource("/{zone_id}/members/{user_id}")
                    .route(web::delete().to(zone::unassign_member)),
            ),
    )
    .service(
        web::scope("/presence")
            // /presence
            .service(
                web::resource("")
                    .route(web::post().to(presence::submit_sample))
                    .route(web::delete().to(presence::stop_presence)),
            )
            .service(web::resource("/failure").route(web::post().to(presence::report_failure)))
            .service(web::resource("/{user_id}").route(web::get().to(presence::get_presence))),
    )
    .service(
        web::scope("/attendance")
            .service(web::resource("/check-in").route(web::post().to(attendance::check_in)))
            .service(web::resource("/check-out").route(web::post().to(attendance::check_out)))
            .service(web::resource("/today").route(web::get().to(attendance::today)))
            .service(web::resource("/events").route(web::get().to(attendance::list_events))),
    )
    .service(
        web::scope("/permissions")
            // /permissions
            .service(
                web::resource("")
                    .route(web::get().to(permission::permission_list))
                    .route(web::post().to(permission::create_permission)),
            )
            // /permissions/pending
            .service(
                web::resource("/pending").route(web::get().to(permission::pending_permissions)),
            )
            // /permissions/{id}
            .service(
                web::resource("/{request_id}").route(web::get().to(permission::get_permission)),
            )
            // /permissions/{id}/approve
            .service(
                web::resource("/{request_id}/approve")
                    .route(web::put().to(permission::approve_permission)),
            )
            // /permissions/{id}/reject
            .service(
                web::resource("/{request_id}/reject")
                    .route(web::put().to(permission::reject_permission)),
            ),
    )
    .service(
        web::scope("/reports")
            .service(web::resource("/daily").route(web::get().to(report::daily_summary)))
            .service(web::resource("/summaries").route(web::get().to(report::list_summaries)))
            .service(web::resource("/live").route(web::get().to(report::live_board))),
    )
    .service(
        web::scope("/live")
            .service(web::resource("/presence").route(web::get().to(live::presence_feed)))
            .service(web::resource("/{collection}").route(web::get().to(live::collection_feed))),
    );
}
