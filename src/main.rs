use dotenvy::dotenv;
use rocket::{Build, Rocket};

#[rocket::launch]
fn rocket() -> Rocket<Build> {
    dotenv().ok();
    env_logger::init();

    println!("🚀 Modern Bank API running");
    println!("📚 Swagger UI → http://localhost:8000/api/docs");

    modern_bank::rocket()
}
