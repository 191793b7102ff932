pub mod comment;
pub mod cors;
pub mod visitor;

use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/comments").configure(comment::config))
        .service(web::scope("/visitor").configure(visitor::config));
}
