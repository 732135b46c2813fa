use rocket::Route;
use rocket::fairing::AdHoc;
use rocket::http::{Header, Status};

pub fn generate_cors_routes() -> Vec<Route> {
    routes![preflight]
}

/// Any origin may call the API. Credentials are not advertised because a
/// wildcard origin forbids them.
pub fn cors_fairing() -> AdHoc {
    AdHoc::on_response("CORS", |_req, res| {
        Box::pin(async move {
            res.set_header(Header::new("Access-Control-Allow-Origin", "*"));
            res.set_header(Header::new(
                "Access-Control-Allow-Methods",
                "GET, POST, OPTIONS",
            ));
            res.set_header(Header::new("Access-Control-Allow-Headers", "*"));
        })
    })
}

#[options("/<_..>")]
pub fn preflight() -> Status {
    Status::NoContent
}
