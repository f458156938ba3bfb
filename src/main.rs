#[rocket::launch]
fn rocket() -> _ {
    let rocket = healthcare_api::rocket();
    log::info!("Starting Healthcare API Server");
    rocket
}
