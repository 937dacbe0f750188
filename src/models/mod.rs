pub mod plot_config;
